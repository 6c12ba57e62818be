// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Integration tests for rendering a small site from disk.
//!
//! These tests drive the public API only: configuration, loading,
//! composition, data aggregation, layouts and hydration.

use std::fs;
use std::path::Path;

use serde_json::json;
use tempfile::tempdir;

use skein::hydration::Placement;
use skein::{Config, Context, Engine, HydrationRegistry, SkeinError};

/// Create a test project structure in a temp directory
fn setup_test_project(dir: &Path) {
    fs::create_dir_all(dir.join("templates/layouts")).unwrap();
    fs::create_dir_all(dir.join("templates/pages")).unwrap();
    fs::create_dir_all(dir.join("templates/components")).unwrap();

    // Root layout, with a stylesheet link and a script in the head
    let root_layout = r#"<data></data>
<template><html>
<head>
<script>window.__boot = "</head><body>";</script>
<link rel="stylesheet" href="/site.css">
<title>{{page.title}}</title>
</head>
<body>
<nav>{{> components/nav}}</nav>
<main>{{{content}}}</main>
</body>
</html></template>"#;
    fs::write(dir.join("templates/layouts/root.sfc"), root_layout).unwrap();

    // Navigation fragment
    fs::write(
        dir.join("templates/components/nav.sfc"),
        r#"{{#each links}}<a href="{{href}}">{{label}}</a>{{/each}}"#,
    )
    .unwrap();

    // Cart widget merging into the shared `store` window attribute
    let cart = r#"<data window="store">{"cart": {"items": {{{cart.count}}} }}</data>
<template><aside>{{store.cart.items}} items</aside></template>"#;
    fs::write(dir.join("templates/components/cart.sfc"), cart).unwrap();

    // Home page
    let home_page = r#"<data window="store" merge="deep" layout="layouts/root">
{"cart": {"open": false}, "user": "{{user.name}}"}
</data>
<template>
<h1>{{page.title}}</h1>
{{> components/cart}}
{{#unless store.cart.open}}<p>cart closed</p>{{/unless}}
</template>"#;
    fs::write(dir.join("templates/pages/home.sfc"), home_page).unwrap();

    // Profile page hydrating a server value through a schema contract
    let profile_page = r#"<schema lang="json" window="profile">{"type": "object"}</schema>
<template><h1>{{profile.name}}</h1></template>"#;
    fs::write(dir.join("templates/pages/profile.sfc"), profile_page).unwrap();

    fs::write(
        dir.join("skein.toml"),
        format!(
            "log_level = \"debug\"\n\n[templates]\nroot_dir = '{}'\n",
            dir.join("templates").display()
        ),
    )
    .unwrap();
}

fn create_engine(dir: &Path) -> Engine<skein::FileSystemLoader> {
    let config = Config::load_or_default(dir).unwrap();
    skein::logging::init_tracing(&config.log_level);
    Engine::from_config(config).unwrap()
}

fn request_context() -> Context {
    Context::builder()
        .request(json!({ "path": "/" }))
        .server(json!({
            "page": { "title": "Shop" },
            "links": [
                { "href": "/", "label": "Home" },
                { "href": "/about", "label": "About" }
            ],
            "cart": { "count": 3 },
            "user": { "name": "Ada" }
        }))
        .build()
        .unwrap()
}

#[test]
fn test_home_page_renders_with_layout_and_partials() {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());
    let engine = create_engine(dir.path());

    let mut registry = HydrationRegistry::new();
    let view = engine
        .render("pages/home", &request_context(), &mut registry, Some("r4nd0m"))
        .unwrap();

    assert!(view.html.contains("<title>Shop</title>"));
    assert!(view
        .html
        .contains(r#"<nav><a href="/">Home</a><a href="/about">About</a></nav>"#));
    assert!(view.html.contains("<h1>Shop</h1>"));
    assert!(view.html.contains("<aside>3 items</aside>"));
    assert!(view.html.contains("<p>cart closed</p>"));
}

#[test]
fn test_merged_window_data_is_hydrated_once() {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());
    let engine = create_engine(dir.path());

    let mut registry = HydrationRegistry::new();
    let view = engine
        .render("pages/home", &request_context(), &mut registry, Some("r4nd0m"))
        .unwrap();

    assert_eq!(
        view.client_data["store"],
        json!({ "cart": { "items": 3, "open": false }, "user": "Ada" })
    );
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.window_attributes(), vec!["store"]);
    assert_eq!(view.html.matches("id=\"skein-data-store\"").count(), 1);
    assert_eq!(view.html.matches(" nonce=\"r4nd0m\"").count(), 2);

    // Early injection lands after the stylesheet link, never inside the
    // boot script that mentions </head>.
    let position = view.injection.unwrap();
    assert_eq!(position.placement, Placement::Early);
    assert!(view.html[..position.offset].ends_with(r#"<link rel="stylesheet" href="/site.css">"#));
    assert!(view.html.contains(r#"window.__boot = "</head><body>";</script>"#));
}

#[test]
fn test_schema_window_hydrates_server_value() {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());
    let engine = create_engine(dir.path());

    let context = Context::builder()
        .server(json!({ "profile": { "name": "Grace", "id": 42 } }))
        .build()
        .unwrap();
    let view = engine.render_page("pages/profile", &context).unwrap();

    assert!(view.html.starts_with("<h1>Grace</h1>"));
    assert_eq!(view.client_data["profile"], json!({ "name": "Grace", "id": 42 }));
    assert_eq!(view.injection.unwrap().placement, Placement::Late);
}

#[test]
fn test_registry_is_request_scoped() {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());
    let engine = create_engine(dir.path());

    let mut registry = HydrationRegistry::new();
    engine
        .render("pages/profile", &request_context(), &mut registry, None)
        .unwrap();
    let err = engine
        .render("pages/profile", &request_context(), &mut registry, None)
        .unwrap_err();
    assert!(matches!(err, SkeinError::Collision { ref window_attribute, .. } if window_attribute == "profile"));

    registry.clear();
    assert!(engine
        .render("pages/profile", &request_context(), &mut registry, None)
        .is_ok());
}

#[test]
fn test_document_names_cannot_escape_root() {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());
    let engine = create_engine(dir.path());

    let err = engine
        .render_page("../skein", &request_context())
        .unwrap_err();
    assert!(matches!(err, SkeinError::TemplateNotFound { ref reason, .. } if reason.is_some()));
}
