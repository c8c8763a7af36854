#![deny(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces,
    clippy::unwrap_used
)]

/*!
Mustache templates for server-rendered pages, fetched and localized through
the courier dispatcher.

Templates are named `<component>/<template>` and fetched from the server on
first use; the [`TemplateCache`] keeps them for the lifetime of the process.
The [`Renderer`] expands a template against a JSON context with three extra
section helpers:

- `{{#str}}key, component, param{{/str}}` inserts a localized string. All
  strings of one render are fetched in a single call after the pass.
- `{{#pix}}key, component, alt text{{/pix}}` renders an icon through the
  `core/pix_icon` template.
- `{{#js}}...{{/js}}` moves a script out of the markup into
  [`Rendered::script`].

Every render also sees `uniqid`, a number unique to the render, and
`globals.config`, the [`SiteConfig`](courier_common::SiteConfig).

## Example
```rust,ignore
use std::sync::Arc;

use courier::{Dispatcher, StringLoader};
use courier_common::SiteConfig;
use courier_http::{HttpSettings, HttpTransport};
use courier_templates::{Renderer, TemplateCache};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = SiteConfig::from_json_str(r#"{"wwwroot": "https://school.example"}"#)?;
    let transport = HttpTransport::new(HttpSettings::from_site_config(&config))?;
    let dispatcher = Dispatcher::on_current_runtime(transport);

    let renderer = Renderer::new(
        Arc::new(TemplateCache::new(dispatcher.clone())),
        Arc::new(StringLoader::new(dispatcher)),
        config,
    );

    let rendered = renderer
        .render("core/notification_info", &json!({"message": "Saved"}))
        .await?;
    println!("{}", rendered.markup);
    if let Some(script) = rendered.script_element() {
        println!("{}", script);
    }
    Ok(())
}
```
*/

/// The template cache.
pub mod cache;
pub use cache::TemplateCache;

mod error;
pub use error::RenderError;

mod helpers;

pub mod mustache;

mod renderer;
pub use renderer::{Rendered, Renderer, TemplateSettings};

mod images;
pub use images::ImageUrl;
