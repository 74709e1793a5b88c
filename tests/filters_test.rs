use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use stache::tpl::HelperCollection;
use stache::{Engine, EngineOptions, Error, Lambda, Value, map};

fn longdate() -> Lambda {
    Lambda::filter(|value| {
        NaiveDate::parse_from_str(&value.to_text(), "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default()
    })
}

fn echo() -> Lambda {
    Lambda::filter(|value| vec![value.clone(), value.clone(), value.clone()])
}

#[test]
fn test_single_filter() {
    let engine = Engine::new(
        EngineOptions::new()
            .helper("longdate", longdate())
            .helper("echo", echo()),
    )
    .unwrap();

    assert_eq!(
        engine
            .render_value("{{% FILTERS }}{{ date | longdate }}", map! { "date" => "2020-01-01" })
            .unwrap(),
        "2020-01-01 00:00:00"
    );
    assert_eq!(
        engine
            .render_value(
                "{{% FILTERS }}{{# word | echo }}{{ . }}!{{/ word | echo }}",
                map! { "word" => "bacon" }
            )
            .unwrap(),
        "bacon!bacon!bacon!"
    );
}

#[test]
fn test_chained_filters() {
    let helpers: HelperCollection = [
        ("longdate", longdate()),
        (
            "withbrackets",
            Lambda::filter(|value| format!("[[{}]]", value.to_text())),
        ),
    ]
    .into_iter()
    .collect();
    let engine = Engine::new(EngineOptions::new().helpers(helpers)).unwrap();

    let out = engine
        .render_value(
            "{{% FILTERS }}{{ date | longdate | withbrackets }}",
            map! { "date" => "2020-01-01" },
        )
        .unwrap();
    assert_eq!(out, "[[2020-01-01 00:00:00]]");
}

#[test]
fn test_chained_section_filters() {
    let with_index = Lambda::filter(|value| {
        let items = value.iterable().unwrap_or_default();
        items
            .into_iter()
            .enumerate()
            .map(|(key, value)| map! { "key" => key, "value" => value })
            .collect::<Vec<_>>()
    });
    let engine = Engine::new(
        EngineOptions::new()
            .helper("echo", echo())
            .helper("with_index", with_index),
    )
    .unwrap();

    let tpl = "{{% FILTERS }}\n{{# word | echo | with_index }}\n{{ key }}: {{ value }}\n{{/ word | echo | with_index }}";
    assert_eq!(
        engine.render_value(tpl, map! { "word" => "bacon" }).unwrap(),
        "0: bacon\n1: bacon\n2: bacon\n"
    );
}

#[test]
fn test_values_are_resolved_before_filtering() {
    let engine = Engine::default();
    let data = || {
        map! {
            "foo" => "FOO",
            "bar" => Lambda::filter(|value| {
                if value.as_str() == Some("FOO") { "win!" } else { "fail :(" }
            }),
        }
    };

    assert_eq!(
        engine
            .render_value("{{% FILTERS }}{{ foo | bar }}", data())
            .unwrap(),
        "win!"
    );
    assert_eq!(
        engine
            .render_value("{{% FILTERS }}{{# foo | bar }}{{ . }}{{/ foo | bar }}", data())
            .unwrap(),
        "win!"
    );
}

#[test]
fn test_broken_pipes() {
    let engine = Engine::default();
    let bar = || Lambda::value(|| "BAR");
    let baz = || Lambda::value(|| "BAZ");

    let cases: Vec<(&str, Value)> = vec![
        ("{{ foo | bar }}", map! {}),
        ("{{ foo | bar }}", map! { "foo" => "FOO" }),
        ("{{ foo | bar }}", map! { "foo" => "FOO", "bar" => "BAR" }),
        ("{{ foo | bar }}", map! { "foo" => "FOO", "bar" => vec![1, 2] }),
        ("{{ foo | bar | baz }}", map! { "foo" => "FOO", "bar" => bar() }),
        ("{{ foo | bar | baz }}", map! { "foo" => "FOO", "baz" => baz() }),
        ("{{ foo | bar | baz }}", map! { "bar" => bar() }),
        ("{{ foo | bar | baz }}", map! { "baz" => baz() }),
        (
            "{{ foo | bar.baz }}",
            map! { "foo" => "FOO", "bar" => bar(), "baz" => baz() },
        ),
    ];

    for (tag, data) in cases {
        let section = tag.replace("{{ ", "{{# ").replace(" }}", " }}{{ . }}");
        let closing = tag.replace("{{ ", "{{/ ");

        for tpl in [
            format!("{{{{% FILTERS }}}}{}", tag),
            format!("{{{{% FILTERS }}}}{}{}", section, closing),
        ] {
            let err = engine.render_value(&tpl, data.clone()).err().unwrap();
            assert!(matches!(err, Error::UnknownFilter(_)), "{}", tpl);
        }
    }
}

#[test]
fn test_unknown_filter_name() {
    let engine = Engine::default();
    let err = engine
        .render_value("{{% FILTERS }}{{ foo | nope }}", map! { "foo" => 1 })
        .err()
        .unwrap();
    assert_eq!(err.filter_name(), Some("nope"));
    assert_eq!(err.to_string(), "Unknown filter: nope");
}

#[test]
fn test_filters_need_the_pragma() {
    let engine = Engine::default();
    assert_eq!(
        engine
            .render_value("[{{ foo | bar }}]", map! { "foo" => "FOO" })
            .unwrap(),
        "[]"
    );

    let engine = Engine::new(
        EngineOptions::new()
            .pragmas(["FILTERS"])
            .helper("upper", Lambda::filter(|v| v.to_text().to_uppercase())),
    )
    .unwrap();
    assert_eq!(
        engine
            .render_value("[{{ foo | upper }}]", map! { "foo" => "foo" })
            .unwrap(),
        "[FOO]"
    );
}
