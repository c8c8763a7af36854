use std::sync::{Arc, Mutex};

use courier::managers::local::LocalTransport;
use courier::{
    Dispatcher, RemoteError, RemoteException, StringRequest, StringResolver, async_trait,
};
use courier_common::{LOAD_TEMPLATE_METHOD, SiteConfig};
use courier_templates::{RenderError, Renderer, TemplateCache};
use serde_json::{Value, json};

const TEMPLATES: &[(&str, &str)] = &[
    (
        "core/pix_icon",
        "<img class=\"icon {{class}}\" alt=\"{{alt}}\" src=\"{{{src}}}\">\n",
    ),
    ("test/hello", "Hello {{#str}}somekey, core{{/str}}"),
    ("test/script", "{{#js}}console.log(1);{{/js}}"),
];

// Answers with "World" for core/somekey and "[key]" for everything else.
#[derive(Default)]
struct StubStrings {
    calls: Mutex<Vec<Vec<StringRequest>>>,
}

#[async_trait]
impl StringResolver for StubStrings {
    async fn get_strings(&self, requests: &[StringRequest]) -> Result<Vec<String>, RemoteError> {
        self.calls.lock().unwrap().push(requests.to_vec());
        Ok(requests
            .iter()
            .map(|request| match (request.key.as_str(), request.component.as_str()) {
                ("somekey", "core") => "World".to_string(),
                ("tricky", _) => "{{_s1}}".to_string(),
                (key, _) => format!("[{}]", key),
            })
            .collect())
    }
}

struct Fixture {
    transport: Arc<LocalTransport>,
    strings: Arc<StubStrings>,
    renderer: Renderer<Arc<LocalTransport>>,
}

fn fixture() -> Fixture {
    let transport = Arc::new(LocalTransport::default());
    transport.register(LOAD_TEMPLATE_METHOD, |args| {
        let name = format!(
            "{}/{}",
            args["component"].as_str().unwrap(),
            args["template"].as_str().unwrap()
        );
        TEMPLATES
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, source)| json!(source))
            .ok_or_else(|| {
                RemoteException::new(format!("Template {} not found", name))
                    .with_errorcode("filenotfound")
            })
    });

    let strings = Arc::new(StubStrings::default());
    let config = SiteConfig {
        wwwroot: "https://school.example".to_string(),
        themerev: 3,
        ..Default::default()
    };
    let renderer = Renderer::new(
        Arc::new(TemplateCache::new(Dispatcher::on_current_runtime(
            Arc::clone(&transport),
        ))),
        strings.clone(),
        config,
    );

    Fixture {
        transport,
        strings,
        renderer,
    }
}

#[tokio::test]
async fn test_string_helper_is_resolved_after_the_pass() {
    let f = fixture();

    let rendered = f.renderer.render("test/hello", &json!({})).await.unwrap();

    assert_eq!(rendered.markup, "Hello World");
    assert_eq!(rendered.script, "");
    assert_eq!(
        *f.strings.calls.lock().unwrap(),
        vec![vec![StringRequest::new("somekey", "core")]]
    );
}

#[tokio::test]
async fn test_icon_and_template_share_one_round_trip_then_stay_cached() {
    let f = fixture();

    f.renderer.render("test/hello", &json!({})).await.unwrap();
    assert_eq!(f.transport.round_trips(), 1);
    let names: Vec<String> = f.transport.batches()[0]
        .iter()
        .map(|call| call.args["template"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["pix_icon", "hello"]);

    f.renderer.render("test/hello", &json!({})).await.unwrap();
    f.renderer.templates().resolve("core/pix_icon").await.unwrap();
    assert_eq!(f.transport.round_trips(), 1);
}

#[tokio::test]
async fn test_script_block_is_extracted() {
    let f = fixture();

    let rendered = f.renderer.render("test/script", &json!({})).await.unwrap();

    assert_eq!(rendered.markup, "");
    assert_eq!(rendered.script, "console.log(1);");
    assert!(f.strings.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_json_param_reaches_the_resolver_as_an_object() {
    let f = fixture();

    let rendered = f
        .renderer
        .render_source(
            "{{#str}}deletecheck, core, {\"a\":\"{{item}}\"}{{/str}}",
            &json!({"item": "fish"}),
        )
        .await
        .unwrap();

    assert_eq!(rendered.markup, "[deletecheck]");
    let calls = f.strings.calls.lock().unwrap();
    assert_eq!(calls[0][0].param, Some(json!({"a": "fish"})));
}

#[tokio::test]
async fn test_malformed_json_param_aborts_the_render() {
    let f = fixture();

    let err = f
        .renderer
        .render_source("{{#str}}deletecheck, core, {a: fish}{{/str}}", &json!({}))
        .await
        .unwrap_err();

    assert!(matches!(err, RenderError::StringArgument { .. }));
    assert!(f.strings.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_fetch_failure_propagates_and_is_not_cached() {
    let f = fixture();
    f.transport
        .fail_with(RemoteError::Transport("connection reset".to_string()));

    let err = f.renderer.render("test/hello", &json!({})).await.unwrap_err();
    assert_eq!(
        err,
        RenderError::Remote(RemoteError::Transport("connection reset".to_string()))
    );
    assert!(f.renderer.templates().is_empty());

    f.transport.clear_failure();
    let rendered = f.renderer.render("test/hello", &json!({})).await.unwrap();
    assert_eq!(rendered.markup, "Hello World");
    assert_eq!(f.transport.round_trips(), 2);
}

#[tokio::test]
async fn test_unknown_template_keeps_the_icon_template() {
    let f = fixture();

    let err = f.renderer.render("test/missing", &json!({})).await.unwrap_err();

    let RenderError::Remote(remote) = &err else {
        panic!("expected a remote error, got {:?}", err);
    };
    assert_eq!(
        remote.exception().and_then(|e| e.errorcode.as_deref()),
        Some("filenotfound")
    );
    assert!(f.renderer.templates().contains("core/pix_icon"));
    assert!(!f.renderer.templates().contains("test/missing"));
}

#[tokio::test]
async fn test_string_failure_fails_the_render() {
    struct Offline;

    #[async_trait]
    impl StringResolver for Offline {
        async fn get_strings(&self, _: &[StringRequest]) -> Result<Vec<String>, RemoteError> {
            Err(RemoteError::Transport("offline".to_string()))
        }
    }

    let transport = Arc::new(LocalTransport::default());
    transport.register(LOAD_TEMPLATE_METHOD, |_| Ok(json!("")));
    let renderer = Renderer::new(
        Arc::new(TemplateCache::new(Dispatcher::on_current_runtime(transport))),
        Arc::new(Offline),
        SiteConfig::default(),
    );

    let err = renderer
        .render_source("Hello {{#str}}somekey, core{{/str}}", &json!({}))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RenderError::Remote(RemoteError::Transport("offline".to_string()))
    );
}

#[tokio::test]
async fn test_icons_globals_and_uniqid() {
    let f = fixture();
    let source = "{{#pix}}t/edit, core, Edit{{/pix}} {{uniqid}} {{{globals.config.wwwroot}}}";

    let first = f.renderer.render_source(source, &json!({})).await.unwrap();
    let second = f.renderer.render_source(source, &json!({})).await.unwrap();

    assert_eq!(
        first.markup,
        "<img class=\"icon smallicon\" alt=\"Edit\" src=\"https://school.example/theme/image.php/boost/core/3/t/edit\"> 1 https://school.example"
    );
    assert!(second.markup.ends_with(" 2 https://school.example"));
}

#[tokio::test]
async fn test_injected_values_override_the_context() {
    let f = fixture();
    let context = json!({
        "uniqid": "fixed",
        "globals": {"config": {"wwwroot": "https://elsewhere.example"}},
        "name": "Ann"
    });
    let source = "id-{{uniqid}} {{globals.config.wwwroot}} {{name}}";

    let first = f.renderer.render_source(source, &context).await.unwrap();
    let second = f.renderer.render_source(source, &context).await.unwrap();

    assert_eq!(first.markup, "id-1 https:&#x2F;&#x2F;school.example Ann");
    assert_ne!(first.markup, second.markup);
}

#[tokio::test]
async fn test_context_text_cannot_take_a_string_placeholder() {
    let f = fixture();

    let rendered = f
        .renderer
        .render_source(
            "<b>{{title}}</b> {{#str}}somekey, core{{/str}}",
            &json!({"title": "{{_s0}}"}),
        )
        .await
        .unwrap();

    assert_eq!(rendered.markup, "<b>{{_s0}}</b> World");
}

#[tokio::test]
async fn test_scripts_are_joined_and_localized() {
    let f = fixture();
    let source = "{{#js}}a('{{#str}}somekey, core{{/str}}'){{/js}}\n<p>{{#str}}other, mod_x{{/str}}</p>\n{{#js}}b(){{/js}}";

    let rendered = f.renderer.render_source(source, &json!({})).await.unwrap();

    assert_eq!(rendered.markup, "<p>[other]</p>");
    assert_eq!(rendered.script, "a('World');\nb()");
    assert_eq!(
        rendered.script_element().as_deref(),
        Some("<script type=\"text/javascript\">a('World');\nb()</script>")
    );
}

#[tokio::test]
async fn test_resolved_text_is_never_expanded_again() {
    let f = fixture();
    let source = "<b>{{name}}</b> {{#str}}tricky, core{{/str}}|{{#str}}somekey, core{{/str}}";

    let rendered = f
        .renderer
        .render_source(source, &json!({"name": "{{fish"}))
        .await
        .unwrap();

    assert_eq!(rendered.markup, "<b>{{fish</b> {{_s1}}|World");
}

#[tokio::test]
async fn test_concurrent_renders_do_not_share_helper_state() {
    let f = fixture();
    let context: Value = json!({});

    let (hello, script) = tokio::join!(
        f.renderer.render("test/hello", &context),
        f.renderer.render("test/script", &context)
    );

    assert_eq!(hello.unwrap().script, "");
    assert_eq!(script.unwrap().markup, "");
}
