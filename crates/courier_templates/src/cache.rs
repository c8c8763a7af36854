use std::sync::Arc;

use courier::{CallMode, Dispatcher, RemoteCall, Runtime, Transport};
use courier_common::LOAD_TEMPLATE_METHOD;
use courier_common::error::RemoteError;
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::error::RenderError;

/// Process-wide cache of template sources, keyed by `<component>/<template>`.
///
/// Entries are never evicted. The first source stored for a name wins, so
/// two passes racing to fetch the same template end up sharing one source.
/// Failed fetches are not cached and are retried on the next resolve.
pub struct TemplateCache<T: Transport, RT: Runtime = tokio::runtime::Handle> {
    dispatcher: Dispatcher<T, RT>,
    templates: DashMap<String, Arc<str>>,
}

impl<T: Transport, RT: Runtime> TemplateCache<T, RT> {
    /// Creates an empty cache fetching through `dispatcher`.
    pub fn new(dispatcher: Dispatcher<T, RT>) -> Self {
        Self {
            dispatcher,
            templates: DashMap::new(),
        }
    }

    /// Whether `name` is cached.
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Number of cached templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether nothing is cached yet.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Returns the source of `name`, fetching it on a miss.
    pub async fn resolve(&self, name: &str) -> Result<Arc<str>, RenderError> {
        split_name(name)?;
        if let Some(hit) = self.templates.get(name) {
            trace!("Template {} served from cache", name);
            return Ok(Arc::clone(hit.value()));
        }

        self.fetch(&[name])
            .await?
            .pop()
            .ok_or(RenderError::Remote(RemoteError::MissingResponse { index: 0 }))
    }

    /// Returns the sources of all `names`, in order.
    ///
    /// Every miss is fetched in the same batch, one call per distinct name.
    /// Any failed fetch fails the whole resolve; sources fetched before the
    /// failure stay cached.
    pub async fn resolve_many(&self, names: &[&str]) -> Result<Vec<Arc<str>>, RenderError> {
        // Ok: cached source, Err: position in `missing`
        let mut slots: Vec<Result<Arc<str>, usize>> = Vec::with_capacity(names.len());
        let mut missing: Vec<&str> = Vec::new();

        for name in names {
            split_name(name)?;
            if let Some(hit) = self.templates.get(*name) {
                slots.push(Ok(Arc::clone(hit.value())));
                continue;
            }
            let position = match missing.iter().position(|m| m == name) {
                Some(position) => position,
                None => {
                    missing.push(*name);
                    missing.len() - 1
                }
            };
            slots.push(Err(position));
        }

        let fetched = self.fetch(&missing).await?;
        Ok(slots
            .into_iter()
            .map(|slot| match slot {
                Ok(source) => source,
                Err(position) => Arc::clone(&fetched[position]),
            })
            .collect())
    }

    async fn fetch(&self, names: &[&str]) -> Result<Vec<Arc<str>>, RenderError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Fetching templates {:?}", names);
        let calls = names
            .iter()
            .map(|name| {
                let (component, template) = split_name(name)?;
                Ok(RemoteCall::new(LOAD_TEMPLATE_METHOD)
                    .arg("component", component)
                    .arg("template", template))
            })
            .collect::<Result<Vec<_>, RenderError>>()?;

        let handles = self.dispatcher.call(calls, CallMode::Async);
        let mut fetched = Vec::with_capacity(names.len());
        for (name, handle) in names.iter().zip(handles) {
            let source: String = handle.wait_as().await?;
            let cached = Arc::clone(
                self.templates
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::from(source))
                    .value(),
            );
            fetched.push(cached);
        }
        Ok(fetched)
    }
}

/// Splits `<component>/<template>`.
pub(crate) fn split_name(name: &str) -> Result<(&str, &str), RenderError> {
    match name.split_once('/') {
        Some((component, template)) if !component.is_empty() && !template.is_empty() => {
            Ok((component, template))
        }
        _ => Err(RenderError::InvalidTemplateName(name.to_string())),
    }
}
