//! TOML-driven resolver fixtures.
//!
//! Each fixture file declares head options, a list of entries in the same
//! shape as a head manifest, and the rendered fragments expected from them:
//!
//! ```toml
//! description = "last registered title wins"
//!
//! [[entry]]
//! [[entry.tag]]
//! kind = "title"
//! text = "A"
//!
//! [expect]
//! head = ["<title>A</title>"]
//! ```

use head::{EntryConfig, Head, HeadOptions, SsrOptions, load_into, render_tags};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Expected {
    pub head: Vec<String>,
    pub body_open: Vec<String>,
    pub body: Vec<String>,
    pub html_attrs: String,
    pub body_attrs: String,
    pub title: Option<String>,
    pub diagnostics: usize,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolveFixture {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub options: HeadOptions,
    #[serde(default, rename = "entry")]
    pub entries: Vec<EntryConfig>,
    pub expect: Expected,
}

/// What a fixture actually produced, in the same shape as [`Expected`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rendered {
    pub head: Vec<String>,
    pub body_open: Vec<String>,
    pub body: Vec<String>,
    pub html_attrs: String,
    pub body_attrs: String,
    pub title: Option<String>,
    pub diagnostics: usize,
}

pub fn load_fixture(path: &Path) -> ResolveFixture {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read fixture {path:?}: {err}"));
    toml::from_str(&content).unwrap_or_else(|err| panic!("failed to parse fixture {path:?}: {err}"))
}

/// Every `*.toml` file under `dir`, sorted by file name.
pub fn load_fixtures(dir: &Path) -> Vec<(PathBuf, ResolveFixture)> {
    let entries = fs::read_dir(dir)
        .unwrap_or_else(|err| panic!("failed to list fixture dir {dir:?}: {err}"));
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();
    paths
        .into_iter()
        .map(|path| {
            let fixture = load_fixture(&path);
            (path, fixture)
        })
        .collect()
}

pub fn render_fixture(fixture: &ResolveFixture) -> Rendered {
    let head = Head::new(fixture.options);
    load_into(&head, &fixture.entries);
    let resolved = head.resolve();
    let options = SsrOptions {
        omit_line_breaks: false,
        ..fixture.options.ssr
    };
    let ssr = render_tags(&resolved, &options);
    Rendered {
        head: split_lines(&ssr.head_tags),
        body_open: split_lines(&ssr.body_tags_open),
        body: split_lines(&ssr.body_tags),
        html_attrs: ssr.html_attrs,
        body_attrs: ssr.body_attrs,
        title: resolved.title().map(str::to_string),
        diagnostics: resolved.diagnostics.len(),
    }
}

/// Panics with a line diff on the first fragment that differs.
pub fn assert_fixture(path: &Path, fixture: &ResolveFixture) {
    let actual = render_fixture(fixture);
    let expect = &fixture.expect;
    for (fragment, expected, got) in [
        ("head", &expect.head, &actual.head),
        ("body_open", &expect.body_open, &actual.body_open),
        ("body", &expect.body, &actual.body),
    ] {
        assert!(
            expected == got,
            "{path:?} ({}): {fragment} mismatch\n{}",
            fixture.description,
            crate::diff_lines(expected, got)
        );
    }
    assert_eq!(
        expect.html_attrs, actual.html_attrs,
        "{path:?}: html_attrs mismatch"
    );
    assert_eq!(
        expect.body_attrs, actual.body_attrs,
        "{path:?}: body_attrs mismatch"
    );
    if let Some(title) = &expect.title {
        assert_eq!(Some(title), actual.title.as_ref(), "{path:?}: title mismatch");
    }
    assert_eq!(
        expect.diagnostics, actual.diagnostics,
        "{path:?}: diagnostic count mismatch"
    );
}

fn split_lines(fragment: &str) -> Vec<String> {
    fragment
        .split('\n')
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
