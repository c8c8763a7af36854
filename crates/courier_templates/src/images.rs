use courier_common::SiteConfig;
use url::form_urlencoded;

/// Builds theme image URLs served by `theme/image.php`.
///
/// ## Example
///
/// ```rust
/// use courier_common::SiteConfig;
/// use courier_templates::ImageUrl;
///
/// let config = SiteConfig {
///     wwwroot: "https://school.example".to_string(),
///     themerev: 1700000000,
///     ..Default::default()
/// };
///
/// assert_eq!(
///     ImageUrl::from_site_config(&config).url("t/edit", ""),
///     "https://school.example/theme/image.php/boost/core/1700000000/t/edit"
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUrl {
    wwwroot: String,
    theme: String,
    themerev: i64,
    slasharguments: bool,
}

impl ImageUrl {
    /// Reads the site root, theme and theme revision from `config`.
    pub fn from_site_config(config: &SiteConfig) -> Self {
        Self {
            wwwroot: config.wwwroot.clone(),
            theme: config.theme.clone(),
            themerev: config.themerev,
            slasharguments: config.slasharguments,
        }
    }

    /// URL of `image` from `component`. An empty component, `moodle` and
    /// `core` all mean the core images.
    ///
    /// The path form needs slash arguments and a positive theme revision.
    pub fn url(&self, image: &str, component: &str) -> String {
        let component = match component.trim() {
            "" | "moodle" | "core" => "core",
            other => other,
        };

        if self.themerev > 0 && self.slasharguments {
            format!(
                "{}/theme/image.php/{}/{}/{}/{}",
                self.wwwroot, self.theme, component, self.themerev, image
            )
        } else {
            let query = form_urlencoded::Serializer::new(String::new())
                .append_pair("theme", &self.theme)
                .append_pair("component", component)
                .append_pair("rev", &self.themerev.to_string())
                .append_pair("image", image)
                .finish();
            format!("{}/theme/image.php?{}", self.wwwroot, query)
        }
    }
}
