use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use courier::{Runtime, StringResolver, Transport};
use courier_common::SiteConfig;
use courier_common::error::RemoteError;
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::cache::TemplateCache;
use crate::error::RenderError;
use crate::helpers::{RenderPass, substitute_strings};
use crate::images::ImageUrl;
use crate::mustache::{Scope, Template};

/// Renderer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSettings {
    /// Template used by `{{#pix}}`.
    ///
    /// Default: `core/pix_icon`
    pub icon_template: String,
    /// CSS class given to icons rendered by `{{#pix}}`.
    ///
    /// Default: `smallicon`
    pub icon_class: String,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            icon_template: "core/pix_icon".to_string(),
            icon_class: "smallicon".to_string(),
        }
    }
}

/// Output of a render.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rendered {
    /// The trimmed markup.
    pub markup: String,
    /// All `{{#js}}` blocks joined with `;\n`. Run it only after the markup
    /// is in the document.
    pub script: String,
}

impl Rendered {
    /// The script block as a `<script>` element, or `None` when the template
    /// had no script.
    pub fn script_element(&self) -> Option<String> {
        if self.script.is_empty() {
            return None;
        }
        Some(format!(
            "<script type=\"text/javascript\">{}</script>",
            self.script
        ))
    }
}

/// Renders cached templates with the `str`, `pix` and `js` helpers.
///
/// Every render works on its own helper state, so one renderer can serve
/// concurrent renders.
pub struct Renderer<T: Transport, RT: Runtime = tokio::runtime::Handle> {
    templates: Arc<TemplateCache<T, RT>>,
    strings: Arc<dyn StringResolver>,
    config: SiteConfig,
    images: ImageUrl,
    settings: TemplateSettings,
    next_uniqid: AtomicU64,
}

impl<T: Transport, RT: Runtime> Renderer<T, RT> {
    /// Creates a renderer with default [`TemplateSettings`].
    pub fn new(
        templates: Arc<TemplateCache<T, RT>>,
        strings: Arc<dyn StringResolver>,
        config: SiteConfig,
    ) -> Self {
        Self {
            templates,
            strings,
            images: ImageUrl::from_site_config(&config),
            config,
            settings: TemplateSettings::default(),
            next_uniqid: AtomicU64::new(1),
        }
    }

    /// Replaces the settings.
    pub fn with_settings(mut self, settings: TemplateSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The template cache this renderer reads from.
    pub fn templates(&self) -> &TemplateCache<T, RT> {
        &self.templates
    }

    /// Renders the template `name` against `context`.
    ///
    /// The icon template and `name` are fetched together when missing, so a
    /// cold render costs one round trip for templates and at most one more
    /// for strings.
    pub async fn render(&self, name: &str, context: &Value) -> Result<Rendered, RenderError> {
        debug!("Rendering {}", name);
        let icon_name = self.settings.icon_template.as_str();
        self.templates.resolve_many(&[icon_name, name]).await?;
        let icon = self.templates.resolve(icon_name).await?;
        let source = self.templates.resolve(name).await?;
        self.render_with_icon(&icon, &source, context).await
    }

    /// Renders template `source` that does not come from the cache.
    pub async fn render_source(
        &self,
        source: &str,
        context: &Value,
    ) -> Result<Rendered, RenderError> {
        let icon = self
            .templates
            .resolve(&self.settings.icon_template)
            .await?;
        self.render_with_icon(&icon, source, context).await
    }

    async fn render_with_icon(
        &self,
        icon: &str,
        source: &str,
        context: &Value,
    ) -> Result<Rendered, RenderError> {
        let Expanded {
            markup,
            scripts,
            strings,
        } = self.expand(icon, source, context)?;

        let resolved = if strings.is_empty() {
            Vec::new()
        } else {
            trace!("Resolving {} strings", strings.len());
            self.strings.get_strings(&strings).await?
        };
        if resolved.len() != strings.len() {
            return Err(RemoteError::Serialization(format!(
                "asked for {} strings, got {}",
                strings.len(),
                resolved.len()
            ))
            .into());
        }

        Ok(Rendered {
            markup: substitute_strings(&markup, &resolved).trim().to_string(),
            script: substitute_strings(&scripts.join(";\n"), &resolved),
        })
    }

    /// The synchronous part of a render: one mustache pass with fresh helper
    /// state.
    fn expand(&self, icon: &str, source: &str, context: &Value) -> Result<Expanded, RenderError> {
        let icon = Template::parse(icon)?;
        let template = Template::parse(source)?;

        let config = serde_json::to_value(&self.config).map_err(RemoteError::from)?;
        let injected = json!({
            "uniqid": self.next_uniqid.fetch_add(1, Ordering::Relaxed),
            "globals": {"config": config},
        });
        let mut scope = Scope::new(context);
        scope.push(&injected);

        let mut pass = RenderPass::new(&icon, &self.images, &self.settings.icon_class);
        let markup = template.render_with(&mut scope, &mut pass)?;
        Ok(Expanded {
            markup,
            scripts: pass.scripts,
            strings: pass.strings,
        })
    }
}

struct Expanded {
    markup: String,
    scripts: Vec<String>,
    strings: Vec<courier::StringRequest>,
}
