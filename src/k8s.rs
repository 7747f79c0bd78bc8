use crate::gateway::{
    ClusterGateway, LogRequest, LogStream, ObjectCache, WatchEvent, WatchSubscription,
};
use crate::model::{ClusterObject, GroupVersionResource, ResourceKind, SPEC_ACTION};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{StreamExt, future};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, LogParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::discovery::{Discovery, Scope, verbs};
use kube::runtime::reflector::Store;
use kube::runtime::reflector::store::Writer;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client, Config, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    context: String,
    cluster: String,
}

impl KubeGateway {
    pub async fn new() -> Result<Self> {
        let kubeconfig = Kubeconfig::read().ok();

        let config = if let Some(kubeconfig_value) = kubeconfig.clone() {
            Config::from_custom_kubeconfig(kubeconfig_value, &KubeConfigOptions::default())
                .await
                .context("failed to infer Kubernetes configuration")?
        } else {
            Config::infer()
                .await
                .context("failed to infer Kubernetes configuration")?
        };

        let cluster = config.cluster_url.to_string();
        let client = Client::try_from(config).context("failed to initialize Kubernetes client")?;
        let context = kubeconfig
            .and_then(|cfg| cfg.current_context)
            .unwrap_or_else(|| "in-cluster".to_string());

        Ok(Self {
            client,
            context,
            cluster,
        })
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    fn dynamic_api(&self, kind: &ResourceKind, namespace: &str) -> Api<DynamicObject> {
        let resource = api_resource(kind);
        if kind.namespaced && !namespace.is_empty() {
            Api::namespaced_with(self.client.clone(), namespace, &resource)
        } else {
            Api::all_with(self.client.clone(), &resource)
        }
    }

    fn pod_api(&self, object: &ClusterObject) -> Result<Api<Pod>> {
        let namespace = object
            .namespace
            .as_deref()
            .with_context(|| format!("{} has no namespace", object.name))?;
        Ok(Api::namespaced(self.client.clone(), namespace))
    }
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn list_types(&self) -> Result<Vec<ResourceKind>> {
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .context("failed to run API discovery")?;

        let mut kinds = BTreeMap::<String, ResourceKind>::new();
        for group in discovery.groups() {
            for (resource, caps) in group.recommended_resources() {
                if resource.plural.contains('/') || !caps.supports_operation(verbs::LIST) {
                    continue;
                }

                let mut kind = ResourceKind {
                    name: resource.plural.clone(),
                    kind: resource.kind.clone(),
                    namespaced: caps.scope == Scope::Namespaced,
                    watchable: caps.supports_operation(verbs::WATCH),
                    gvr: GroupVersionResource::new(
                        &resource.group,
                        &resource.version,
                        &resource.plural,
                    ),
                    actions: vec![SPEC_ACTION.to_string()],
                };
                for (subresource, _) in &caps.subresources {
                    if let Some(action) = subresource.plural.rsplit('/').next() {
                        kind.push_action(action);
                    }
                }
                kinds.entry(kind.name.clone()).or_insert(kind);
            }
        }

        Ok(kinds.into_values().collect())
    }

    async fn list_objects(
        &self,
        kind: &ResourceKind,
        namespace: &str,
    ) -> Result<Vec<ClusterObject>> {
        let list = self
            .dynamic_api(kind, namespace)
            .list(&ListParams::default())
            .await
            .with_context(|| format!("failed to list {}", kind.name))?;
        Ok(list.items.iter().filter_map(to_cluster_object).collect())
    }

    async fn watch(&self, kind: &ResourceKind, namespace: &str) -> Result<WatchSubscription> {
        let api = self.dynamic_api(kind, namespace);
        // The watcher only connects when polled, so check access up front.
        api.list(&ListParams::default().limit(1))
            .await
            .with_context(|| format!("failed to watch {}", kind.name))?;

        let writer = Writer::<DynamicObject>::new(api_resource(kind));
        let store = writer.as_reader();
        let events = watcher::watcher(api, watcher::Config::default())
            .modify(|object| object.managed_fields_mut().clear())
            .default_backoff()
            .reflect(writer)
            .filter_map(|event| future::ready(translate_event(event)))
            .boxed();

        debug!("watching {} in {:?}", kind.gvr, namespace);
        Ok(WatchSubscription {
            events,
            cache: Arc::new(StoreCache(store)),
        })
    }

    async fn stream_logs(&self, request: &LogRequest) -> Result<LogStream> {
        let pods = self.pod_api(&request.object)?;
        let stream = pods
            .log_stream(&request.object.name, &log_params(request))
            .await
            .with_context(|| format!("failed to stream logs for {}", request.object.name))?;
        Ok(Box::pin(stream))
    }

    async fn fetch_logs(&self, request: &LogRequest) -> Result<String> {
        let pods = self.pod_api(&request.object)?;
        pods.logs(&request.object.name, &log_params(request))
            .await
            .with_context(|| format!("failed to load logs for {}", request.object.qualified_name()))
    }
}

struct StoreCache(Store<DynamicObject>);

impl ObjectCache for StoreCache {
    fn snapshot(&self) -> Vec<ClusterObject> {
        self.0
            .state()
            .iter()
            .filter_map(|object| to_cluster_object(object))
            .collect()
    }
}

fn translate_event(event: watcher::Result<Event<DynamicObject>>) -> Option<Result<WatchEvent>> {
    match event {
        Ok(Event::Apply(object)) => to_cluster_object(&object).map(WatchEvent::Applied).map(Ok),
        Ok(Event::Delete(object)) => to_cluster_object(&object).map(WatchEvent::Deleted).map(Ok),
        Ok(Event::InitDone) => Some(Ok(WatchEvent::Restarted)),
        Ok(Event::Init | Event::InitApply(_)) => None,
        Err(error) => Some(Err(anyhow::Error::new(error).context("watch stream failed"))),
    }
}

fn api_resource(kind: &ResourceKind) -> ApiResource {
    let gvk = GroupVersionKind::gvk(&kind.gvr.group, &kind.gvr.version, &kind.kind);
    ApiResource::from_gvk_with_plural(&gvk, &kind.gvr.resource)
}

fn to_cluster_object(object: &DynamicObject) -> Option<ClusterObject> {
    serde_json::to_value(object)
        .ok()
        .and_then(ClusterObject::from_body)
}

fn log_params(request: &LogRequest) -> LogParams {
    LogParams {
        container: Some(request.container.clone()).filter(|container| !container.is_empty()),
        follow: request.follow,
        tail_lines: Some(request.tail_lines),
        ..LogParams::default()
    }
}
