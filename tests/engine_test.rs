use pretty_assertions::assert_eq;
use serde::Serialize;
use stache::tpl::{ArrayLoader, Cache, MemoryCache, StringLoader};
use stache::{Engine, EngineOptions, Error, Lambda, Object, Property, Value, map};
use std::sync::Arc;

#[derive(Serialize)]
struct Order {
    customer: String,
    items: Vec<Item>,
    paid: bool,
}

#[derive(Serialize)]
struct Item {
    name: String,
    qty: u32,
}

#[test]
fn test_render_serializable_data() {
    let engine = Engine::default();
    let order = Order {
        customer: "Ada".to_string(),
        items: vec![
            Item {
                name: "tea".to_string(),
                qty: 2,
            },
            Item {
                name: "scone".to_string(),
                qty: 1,
            },
        ],
        paid: false,
    };

    let tpl = "{{ customer }}:{{# items }} {{ qty }}x{{ name }}{{/ items }}{{^ paid }} (unpaid){{/ paid }}";
    assert_eq!(
        engine.render(tpl, &order).unwrap(),
        "Ada: 2xtea 1xscone (unpaid)"
    );
}

#[test]
fn test_sections_and_iteration() {
    let engine = Engine::default();
    let data = map! {
        "list" => vec![1, 2, 3],
        "empty" => Vec::<i32>::new(),
        "nested" => map! { "name" => "inner" },
        "name" => "outer",
    };

    assert_eq!(
        engine
            .render_value("{{#list}}<{{.}}>{{/list}}", data.clone())
            .unwrap(),
        "<1><2><3>"
    );
    assert_eq!(
        engine
            .render_value("{{#empty}}x{{/empty}}{{^empty}}none{{/empty}}", data.clone())
            .unwrap(),
        "none"
    );
    assert_eq!(
        engine
            .render_value("{{#nested}}{{name}}{{/nested}} {{name}}", data)
            .unwrap(),
        "inner outer"
    );
}

#[test]
fn test_dot_notation() {
    let engine = Engine::default();
    let data = map! { "a" => map! { "b" => map! { "c" => "deep" } } };
    assert_eq!(
        engine
            .render_value("[{{a.b.c}}][{{a.x.c}}]", data)
            .unwrap(),
        "[deep][]"
    );
}

#[test]
fn test_standalone_lines_are_removed() {
    let engine = Engine::default();
    let tpl = "begin\n{{#a}}\nyes\n{{/a}}\n{{! note }}\nend\n";
    assert_eq!(
        engine.render_value(tpl, map! { "a" => true }).unwrap(),
        "begin\nyes\nend\n"
    );
}

#[test]
fn test_escaping() {
    let engine = Engine::default();
    let data = map! { "q" => "\"'<>&" };
    assert_eq!(
        engine
            .render_value("{{ q }}|{{{ q }}}|{{& q }}", data)
            .unwrap(),
        "&quot;&#039;&lt;&gt;&amp;|\"'<>&|\"'<>&"
    );
}

#[test]
fn test_delimiter_changes() {
    let engine = Engine::default();
    assert_eq!(
        engine
            .render_value("{{=<% %>=}}<% a %>{{ a }}<%={{ }}=%>{{ a }}", map! { "a" => "x" })
            .unwrap(),
        "x{{ a }}x"
    );
}

#[test]
fn test_comments() {
    let engine = Engine::default();
    assert_eq!(engine.render("a{{! hidden }}b", &()).unwrap(), "ab");
}

#[test]
fn test_nested_partials_are_indented() {
    let partials = [
        ("a", " {{> b }}"),
        ("b", " {{> d }}"),
        ("c", " {{> d }}{{> d }}"),
        ("d", "D!"),
    ];
    let engine = Engine::new(EngineOptions::new().partials(partials)).unwrap();

    assert_eq!(engine.render(" {{> a }}", &()).unwrap(), "   D!");
    assert_eq!(engine.render(" {{> b }}", &()).unwrap(), "  D!");
    assert_eq!(engine.render(" {{> c }}", &()).unwrap(), "  D!D!");
}

#[test]
fn test_standalone_partial_indents_every_line() {
    let engine = Engine::new(
        EngineOptions::new().partials([("list", "<li>{{ a }}</li>\n<li>{{ b }}</li>\n")]),
    )
    .unwrap();
    let out = engine
        .render_value("<ul>\n  {{> list }}\n</ul>\n", map! { "a" => 1, "b" => 2 })
        .unwrap();
    assert_eq!(out, "<ul>\n  <li>1</li>\n  <li>2</li>\n</ul>\n");
}

#[test]
fn test_templates_from_loader() {
    let loader = ArrayLoader::with_templates([
        ("page", "<h1>{{ title }}</h1>{{> footer }}"),
        ("footer", "<footer>{{ year }}</footer>"),
    ]);
    let engine = Engine::new(EngineOptions::new().loader(loader)).unwrap();
    let out = engine
        .render_value("page", map! { "title" => "Hi", "year" => 2024 })
        .unwrap();
    assert_eq!(out, "<h1>Hi</h1><footer>2024</footer>");
}

#[test]
fn test_missing_partial_renders_empty() {
    let engine = Engine::new(EngineOptions::new().partials([("a", "A")])).unwrap();
    assert_eq!(engine.render("[{{> a }}{{> nope }}]", &()).unwrap(), "[A]");
}

#[test]
fn test_mustache_injection() {
    let mut engine = Engine::default();
    let interpolation = map! { "a" => "{{ b }}", "b" => "FAIL" };
    let section = map! { "a" => true, "b" => "{{ c }}", "c" => "FAIL" };

    assert_eq!(engine.render_value("{{ a }}", interpolation.clone()).unwrap(), "{{ b }}");
    assert_eq!(engine.render_value("{{{ a }}}", interpolation.clone()).unwrap(), "{{ b }}");
    assert_eq!(
        engine.render_value("{{# a }}{{ b }}{{/ a }}", section.clone()).unwrap(),
        "{{ c }}"
    );
    assert_eq!(
        engine.render_value("{{# a }}{{{ b }}}{{/ a }}", section).unwrap(),
        "{{ c }}"
    );

    let mut partials = indexmap::IndexMap::new();
    partials.insert("partial".to_string(), "{{ a }}".to_string());
    engine.set_partials(partials).unwrap();
    assert_eq!(engine.render_value("{{> partial }}", interpolation).unwrap(), "{{ b }}");

    let lambda_interpolation = map! {
        "a" => Lambda::value(|| "{{ b }}"),
        "b" => "{{ c }}",
        "c" => "FAIL",
    };
    assert_eq!(engine.render_value("{{ a }}", lambda_interpolation).unwrap(), "{{ c }}");

    let lambda_section = map! {
        "a" => Lambda::section(|text, _| Ok(format!("{{{{ {} }}}}", text))),
        "b" => "{{ c }}",
        "c" => "FAIL",
    };
    assert_eq!(
        engine.render_value("{{# a }}b{{/ a }}", lambda_section).unwrap(),
        "{{ c }}"
    );
}

struct Monster {
    title: Option<&'static str>,
    name: &'static str,
}

impl Object for Monster {
    fn property(&self, name: &str) -> Property {
        match name {
            "title" => Property::Public(self.title.into()),
            "name" => Property::Public(self.name.into()),
            _ => Property::Undefined,
        }
    }
}

#[test]
fn test_object_properties() {
    let engine = Engine::default();
    let tpl = "{{#title}}{{title}} {{/title}}{{name}}";

    let frank = Value::Object(Arc::new(Monster {
        title: Some("Dr."),
        name: "Frankenstein",
    }));
    assert_eq!(engine.render_value(tpl, frank).unwrap(), "Dr. Frankenstein");

    let igor = Value::Object(Arc::new(Monster {
        title: None,
        name: "Igor",
    }));
    assert_eq!(engine.render_value(tpl, igor).unwrap(), "Igor");
}

#[test]
fn test_null_property_masks_outer_value() {
    let data = map! { "a" => map! { "b" => Value::Null }, "b" => "outer" };
    let tpl = "{{#a}}[{{b}}]{{/a}}";

    let engine = Engine::default();
    assert_eq!(engine.render_value(tpl, data.clone()).unwrap(), "[]");

    let engine = Engine::new(EngineOptions::new().buggy_property_shadowing(true)).unwrap();
    assert_eq!(engine.render_value(tpl, data).unwrap(), "[outer]");
}

#[test]
fn test_anchored_dot() {
    let data = map! { "a" => map! { "c" => 1 }, "b" => "root" };
    let tpl = "{{#a}}[{{.b}}][{{b}}][{{.c}}]{{/a}}";

    let engine = Engine::new(EngineOptions::new().pragmas(["ANCHORED-DOT"])).unwrap();
    assert_eq!(engine.render_value(tpl, data).unwrap(), "[][root][1]");
}

#[test]
fn test_dynamic_names() {
    let engine = Engine::new(
        EngineOptions::new()
            .pragmas(["DYNAMIC-NAMES"])
            .loader(StringLoader)
            .partials([
                (
                    "foobarbaz",
                    "{{% BLOCKS }}{{$ foo }}foo{{/ foo }}{{$ bar }}bar{{/ bar }}{{$ baz }}baz{{/ baz }}",
                ),
                ("qux", "qux"),
            ]),
    )
    .unwrap();

    let out = engine
        .render_value(
            "{{% BLOCKS }}{{< *partial }}{{$ bar }}{{ value }}{{/ bar }}{{/ *partial }}",
            map! { "partial" => "foobarbaz", "value" => "BAR" },
        )
        .unwrap();
    assert_eq!(out, "fooBARbaz");

    let out = engine
        .render_value("{{>* which }}", map! { "which" => "qux" })
        .unwrap();
    assert_eq!(out, "qux");

    for tpl in [
        "{{>* foo }}",
        "{{>* foo.bar.baz }}",
        "{{=* *=}}",
        "{{! *foo }}",
        "{{! foo.*bar }}",
        "{{% FILTERS }}{{! foo | *bar }}",
        "{{% BLOCKS }}{{< *foo }}{{/ *foo }}",
    ] {
        assert_eq!(engine.render(tpl, &()).unwrap(), "", "{}", tpl);
    }

    for tpl in [
        "{{# foo }}{{/ *foo }}",
        "{{^ foo }}{{/ *foo }}",
        "{{% BLOCKS }}{{< foo }}{{/ *foo }}",
        "{{% BLOCKS }}{{$ foo }}{{/ *foo }}",
    ] {
        let err = engine.render(tpl, &()).err().unwrap();
        assert!(err.to_string().starts_with("Nesting error:"), "{}", tpl);
    }
}

#[test]
fn test_syntax_errors() {
    let engine = Engine::default();

    let err = engine.render("{{# a }}", &()).err().unwrap();
    assert_eq!(err.to_string(), "Missing closing tag: a opened on line 0");
    assert_eq!(err.token().map(|t| t.name()), Some("a"));

    let err = engine.render("line\n{{/ a }}", &()).err().unwrap();
    assert_eq!(err.to_string(), "Unexpected closing tag: /a on line 1");

    let err = engine.render("{{# a }}{{/ b }}", &()).err().unwrap();
    assert!(matches!(err, Error::Syntax { .. }));
}

#[test]
fn test_template_handle() {
    let engine = Engine::default();
    let template = engine.load_template("{{ greeting }}, {{ name }}!").unwrap();
    assert!(template.name().starts_with("__Stache_"));
    assert_eq!(
        template
            .render_value(map! { "greeting" => "Hi", "name" => "Bo" })
            .unwrap(),
        "Hi, Bo!"
    );
    assert_eq!(template.render(&()).unwrap(), ", !");
}

#[test]
fn test_rendering_is_deterministic() {
    let tpl = "{{# items }}{{ name }}={{ qty }}\n{{/ items }}{{^ paid }}unpaid{{/ paid }}";
    let order = Order {
        customer: "Ada".to_string(),
        items: vec![
            Item {
                name: "tea".to_string(),
                qty: 2,
            },
            Item {
                name: "scone".to_string(),
                qty: 1,
            },
        ],
        paid: false,
    };

    let fresh = Engine::default().render(tpl, &order).unwrap();
    assert_eq!(fresh, "tea=2\nscone=1\nunpaid");

    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let cached = Engine::new(EngineOptions::new().shared_cache(cache.clone())).unwrap();
    assert_eq!(cached.render(tpl, &order).unwrap(), fresh);
    assert_eq!(cached.render(tpl, &order).unwrap(), fresh);

    // a second engine activates the stored program instead of compiling
    let reloaded = Engine::new(EngineOptions::new().shared_cache(cache)).unwrap();
    assert_eq!(reloaded.render(tpl, &order).unwrap(), fresh);
}

#[test]
fn test_text_without_tags_is_unchanged() {
    let engine = Engine::default();
    for text in [
        "",
        "plain text",
        "trailing newline\n",
        "windows\r\nline endings\r\n",
        "  \n\n\t indented\n",
        "single { and } braces",
    ] {
        assert_eq!(engine.render(text, &()).unwrap(), text, "{:?}", text);
    }
}
