use std::sync::Arc;

use http::header::ACCEPT;
use http::{HeaderValue, StatusCode};
use insta::assert_snapshot;
use podium_dispatch::{
    has_permission, Action, AllowOnly, Arguments, Controller, Decoration, DispatchConfig,
    DispatchError, Dispatcher, Exposition, FieldValidators, FlashStatus, HookError, Identity,
    Params, Request, RequestContext, ValidationIntent,
};
use podium_render::{MiniJinjaEngine, Renderers};
use serde_json::{json, Value};

const TEMPLATES: &[(&str, &str)] = &[
    (
        "users/edit.html",
        r#"<form>{% for field, message in errors|items %}<em>{{ field }}: {{ message }}</em>{% endfor %}<input name="age" value="{{ values.age }}"></form>"#,
    ),
    ("users/saved.html", "<p>Saved {{ name }} ({{ age }})</p>"),
    ("users/show.html", "<h1>{{ user.name }}</h1>"),
    ("base/index.html", "<p>base: {{ title }}</p>"),
    ("child/index.html", "<p>child: {{ title }}</p>"),
    ("whoami.txt", "{{ user }} via {{ via }}"),
];

fn dispatcher() -> Dispatcher {
    dispatcher_with(Dispatcher::builder())
}

fn dispatcher_with(builder: podium_dispatch::DispatcherBuilder) -> Dispatcher {
    let jinja = MiniJinjaEngine::new()
        .with_templates(TEMPLATES.iter().copied())
        .unwrap();
    builder
        .renderer(Arc::new(Renderers::with_defaults(jinja)))
        .build()
}

fn params(value: Value) -> Params {
    value.as_object().cloned().unwrap_or_default()
}

fn age_field() -> ValidationIntent {
    ValidationIntent::new(FieldValidators::new().field("age", |value| {
        value
            .and_then(Value::as_str)
            .and_then(|s| s.trim().parse::<u32>().ok())
            .map(|age| json!(age))
            .ok_or_else(|| "Please enter a number".to_string())
    }))
}

fn users() -> Arc<Controller> {
    Controller::builder("users")
        .action(
            "edit",
            Action::new(|ctx: &mut RequestContext, _args: Arguments| -> anyhow::Result<Value> {
                Ok(json!({
                    "errors": ctx.validation.errors,
                    "values": ctx.validation.values,
                }))
            })
            .decorate(Decoration::builder().expose("jinja:users/edit.html").build()),
        )
        .action(
            "save",
            Action::new(|_ctx: &mut RequestContext, args: Arguments| {
                Ok::<_, anyhow::Error>(json!({
                    "name": args.get_str("name").unwrap_or("anonymous"),
                    "age": args.get("age"),
                }))
            })
            .decorate(
                Decoration::builder()
                    .expose("jinja:users/saved.html")
                    .expose("json")
                    .validate(age_field().error_handler("edit"))
                    .build(),
            ),
        )
        .action(
            "show",
            Action::new(|_ctx: &mut RequestContext, args: Arguments| {
                Ok::<_, anyhow::Error>(json!({
                    "user": { "id": args.get_str("id"), "name": "Ada" },
                    "password_hash": "x1y2",
                }))
            })
            .args(["id"])
            .decorate(
                Decoration::builder()
                    .expose("jinja:users/show.html")
                    .expose_with(Exposition::new("json").exclude(["password_hash"]))
                    .build(),
            ),
        )
        .build()
        .unwrap()
}

#[test]
fn test_valid_form_renders_action_template() {
    let d = dispatcher();
    let mut ctx = d.context(Request::get("/users/save"));
    let body = d
        .handle(
            &users(),
            "save",
            &mut ctx,
            params(json!({"name": "Ada", "age": " 36 "})),
            &[],
        )
        .unwrap();

    assert_snapshot!(body, @"<p>Saved Ada (36)</p>");
    assert_eq!(
        ctx.response.content_type(),
        Some("text/html; charset=utf-8")
    );
}

#[test]
fn test_invalid_form_redisplays_with_errors() {
    let d = dispatcher();
    let mut ctx = d.context(Request::get("/users/save"));
    let body = d
        .handle(
            &users(),
            "save",
            &mut ctx,
            params(json!({"name": "Ada", "age": "<old>"})),
            &[],
        )
        .unwrap();

    assert_snapshot!(body, @r#"<form><em>age: Please enter a number</em><input name="age" value="&lt;old&gt;"></form>"#);
    assert_eq!(ctx.validation.error("age"), Some("Please enter a number"));
}

#[test]
fn test_accept_json_negotiates_json_engine() {
    let d = dispatcher();
    let request = Request::get("/users/show/7")
        .with_header(ACCEPT, HeaderValue::from_static("application/json"));
    let mut ctx = d.context(request);
    let body = d
        .handle(&users(), "show", &mut ctx, Params::new(), &["7".to_string()])
        .unwrap();

    assert_snapshot!(body, @r#"{"user":{"id":"7","name":"Ada"}}"#);
    assert_eq!(
        ctx.response.content_type(),
        Some("application/json; charset=utf-8")
    );
}

#[test]
fn test_browser_accept_gets_html() {
    let d = dispatcher();
    let request = Request::get("/users/show/7").with_header(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,*/*;q=0.8"),
    );
    let mut ctx = d.context(request);
    let body = d
        .handle(&users(), "show", &mut ctx, Params::new(), &["7".to_string()])
        .unwrap();

    assert_snapshot!(body, @"<h1>Ada</h1>");
}

#[test]
fn test_testing_variables_record_render_inputs() {
    let d = dispatcher();
    let request = Request::get("/users/show/7").with_response_type("application/json");
    let mut ctx = d.context(request).with_testing();
    d.handle(&users(), "show", &mut ctx, Params::new(), &["7".to_string()])
        .unwrap();

    let testing = ctx.testing.unwrap();
    assert_eq!(testing.exclude_names, vec!["password_hash"]);
    assert!(!testing.namespace.unwrap().contains_key("password_hash"));
    assert!(!testing.controller_output.unwrap().contains_key("password_hash"));
    assert_eq!(testing.template_name, None);
}

#[derive(Debug)]
struct CurrentUser(String);

#[test]
fn test_global_hook_shares_state_through_extensions() {
    let d = dispatcher_with(Dispatcher::builder().before_call(|ctx, _args| {
        let user = ctx
            .request
            .identity
            .as_ref()
            .map(|identity| identity.user.clone())
            .ok_or_else(|| HookError::before_call("no identity"))?;
        ctx.extensions.insert(CurrentUser(user));
        Ok(())
    }));
    let controller = Controller::builder("me")
        .action(
            "whoami",
            Action::new(|ctx: &mut RequestContext, _args: Arguments| -> anyhow::Result<Value> {
                let user = ctx.extensions.get_required::<CurrentUser>()?;
                Ok(json!({ "user": user.0 }))
            })
            .decorate(
                Decoration::builder()
                    .expose("jinja:whoami.txt")
                    .before_render(|_ctx, _args, output| {
                        if let podium_dispatch::Output::Render(namespace) = output {
                            namespace.insert("via".into(), json!("hook"));
                        }
                        Ok(())
                    })
                    .build(),
            ),
        )
        .build()
        .unwrap();

    let mut ctx = d.context(Request::get("/me").with_identity(Identity::new("ada")));
    let body = d
        .handle(&controller, "whoami", &mut ctx, Params::new(), &[])
        .unwrap();
    assert_snapshot!(body, @"ada via hook");

    let mut anonymous = d.context(Request::get("/me"));
    let err = d
        .handle(&controller, "whoami", &mut anonymous, Params::new(), &[])
        .unwrap_err();
    assert_eq!(err.to_string(), "hook error (before_call): no identity");
}

fn admin() -> Arc<Controller> {
    Controller::builder("admin")
        .allow_only(AllowOnly::predicate(has_permission("manage")))
        .action(
            "index",
            Action::new(|_ctx: &mut RequestContext, _args: Arguments| {
                Ok::<_, anyhow::Error>("dashboard")
            })
            .decorate(Decoration::builder().expose("json").build()),
        )
        .build()
        .unwrap()
}

#[test]
fn test_anonymous_denied_with_401() {
    let d = dispatcher();
    let mut ctx = d.context(Request::get("/admin"));
    let err = d
        .handle(&admin(), "index", &mut ctx, Params::new(), &[])
        .unwrap_err();

    assert!(matches!(
        err,
        DispatchError::Abort { status, .. } if status == StatusCode::UNAUTHORIZED
    ));
    let flash = ctx.response.flash.unwrap();
    assert_eq!(flash.status, FlashStatus::Warning);
    assert_snapshot!(flash.message, @r#"The user must have the "manage" permission"#);
}

#[test]
fn test_authenticated_denied_with_403() {
    let d = dispatcher();
    let mut ctx = d.context(Request::get("/admin").with_identity(Identity::new("bob")));
    let err = d
        .handle(&admin(), "index", &mut ctx, Params::new(), &[])
        .unwrap_err();

    assert_eq!(err.status(), StatusCode::FORBIDDEN);
    assert_eq!(ctx.response.status, StatusCode::FORBIDDEN);
    assert_eq!(ctx.response.flash.unwrap().status, FlashStatus::Error);
}

#[test]
fn test_permitted_user_reaches_action() {
    let d = dispatcher();
    let identity = Identity::new("carol").with_permission("manage");
    let mut ctx = d.context(Request::get("/admin").with_identity(identity));
    let body = d
        .handle(&admin(), "index", &mut ctx, Params::new(), &[])
        .unwrap();
    assert_eq!(body, "dashboard");
}

#[test]
fn test_inherited_decoration_keeps_parent_expositions() {
    let index = || {
        Action::new(|_ctx: &mut RequestContext, _args: Arguments| {
            Ok::<_, anyhow::Error>(json!({ "title": "Home" }))
        })
    };
    let base = Controller::builder("base")
        .action(
            "index",
            index().decorate(
                Decoration::builder()
                    .expose("jinja:base/index.html")
                    .expose_with(Exposition::new("json").render_param("pretty", true))
                    .build(),
            ),
        )
        .build()
        .unwrap();
    let child = Controller::builder("child")
        .extends(&base)
        .action(
            "index",
            index().decorate(
                Decoration::builder()
                    .expose("jinja:child/index.html")
                    .inherit()
                    .build(),
            ),
        )
        .build()
        .unwrap();
    let d = dispatcher();

    let mut ctx = d.context(Request::get("/"));
    let html = d.handle(&child, "index", &mut ctx, Params::new(), &[]).unwrap();
    assert_snapshot!(html, @"<p>child: Home</p>");

    let request =
        Request::get("/").with_header(ACCEPT, HeaderValue::from_static("application/json"));
    let mut ctx = d.context(request);
    let json = d.handle(&child, "index", &mut ctx, Params::new(), &[]).unwrap();
    assert_eq!(json, "{\n  \"title\": \"Home\"\n}");
}

#[test]
fn test_config_from_yaml_drives_defaults() {
    let config = DispatchConfig::from_yaml_str(
        "default_renderer: json\nignore_parameters: [\"_\"]\n",
    )
    .unwrap();
    let d = dispatcher_with(Dispatcher::builder().config(config));
    let controller = Controller::builder("c")
        .action(
            "echo",
            Action::new(|_ctx: &mut RequestContext, args: Arguments| {
                Ok::<_, anyhow::Error>(Value::Object(args.named))
            })
            .decorate(Decoration::builder().expose("page.html").build()),
        )
        .build()
        .unwrap();

    let mut ctx = d.context(Request::get("/"));
    let body = d
        .handle(
            &controller,
            "echo",
            &mut ctx,
            params(json!({"q": "rust", "_": "cachebust"})),
            &[],
        )
        .unwrap();
    assert_snapshot!(body, @r#"{"q":"rust"}"#);
}
