//! Template engines for `podium-dispatch`.
//!
//! The dispatcher picks an engine name and a template for each request and
//! hands the namespace to a [`TemplateRenderer`](podium_dispatch::TemplateRenderer).
//! This crate provides the engines and a [`Renderers`] registry implementing
//! that trait:
//!
//! - [`MiniJinjaEngine`]: Jinja2-compatible templates, auto-escaped by extension
//! - [`JsonEngine`]: the namespace serialized as JSON
//!
//! ```rust
//! use std::sync::Arc;
//! use podium_dispatch::{
//!     Action, Arguments, Controller, Decoration, Dispatcher, Request, RequestContext,
//! };
//! use podium_render::{MiniJinjaEngine, Renderers};
//! use serde_json::json;
//!
//! let jinja = MiniJinjaEngine::new()
//!     .with_templates([("hello.html", "<p>Hello {{ name }}</p>")])
//!     .unwrap();
//! let dispatcher = Dispatcher::builder()
//!     .renderer(Arc::new(Renderers::with_defaults(jinja)))
//!     .build();
//!
//! let root = Controller::builder("root")
//!     .action(
//!         "hello",
//!         Action::new(|_ctx: &mut RequestContext, args: Arguments| {
//!             Ok::<_, anyhow::Error>(json!({ "name": args.get_str("name") }))
//!         })
//!         .args(["name"])
//!         .decorate(Decoration::builder().expose("jinja:hello.html").build()),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let mut ctx = dispatcher.context(Request::get("/hello/ada"));
//! let body = dispatcher
//!     .handle(&root, "hello", &mut ctx, Default::default(), &["ada".to_string()])
//!     .unwrap();
//! assert_eq!(body, "<p>Hello ada</p>");
//! ```

mod engine;
mod error;
mod registry;

pub use engine::{JsonEngine, MiniJinjaEngine, TemplateEngine};
pub use error::RenderError;
pub use registry::Renderers;
