use dom_store::LiveDom;
use head::{
    DocumentRoot, DomPatch, DomPatchError, DomReconciler, ElementView, EntryOptions, Head,
    HeadOptions, LiveDocument, PatchKey, ReconcileError, SsrOptions, TagContent, TagInput, Zone,
    render_ssr_head,
};
use std::sync::Arc;

fn attr(name: &str, value: &str) -> (Arc<str>, Option<String>) {
    (Arc::from(name), Some(value.to_string()))
}

fn sync(head: &Head, reconciler: &mut DomReconciler, dom: &mut LiveDom) -> head::ReconcileOutcome {
    reconciler
        .reconcile(&head.resolve(), dom)
        .expect("reconcile succeeds")
}

#[test]
fn title_override_is_a_single_content_patch() {
    let head = Head::client();
    head.push(
        vec![
            TagInput::title("Shop"),
            TagInput::meta_name("description", "All products"),
            TagInput::link("stylesheet", "/main.css"),
        ],
        EntryOptions::default(),
    );
    let mut dom = LiveDom::new();
    let mut reconciler = DomReconciler::new();
    sync(&head, &mut reconciler, &mut dom);
    let version = dom.version();

    let page = head.push(vec![TagInput::title("Shoes")], EntryOptions::default());
    let outcome = sync(&head, &mut reconciler, &mut dom);
    assert_eq!(outcome.patches.len(), 1);
    assert!(matches!(
        &outcome.patches[0],
        DomPatch::SetContent { content: Some(TagContent::Text(t)), .. } if t == "Shoes"
    ));
    assert_eq!(dom.version(), version + 1);

    assert!(head.remove(page));
    sync(&head, &mut reconciler, &mut dom);
    assert_eq!(
        dom.outline(DocumentRoot::Head),
        vec![
            "<title data-head=\"title\">Shop</title>",
            "<meta name=\"description\" content=\"All products\" data-head=\"meta:name:description\">",
            "<link rel=\"stylesheet\" href=\"/main.css\" data-head=\"link:stylesheet:/main.css\">",
        ]
    );
}

#[test]
fn resolving_without_changes_skips_the_document() {
    let head = Head::client();
    head.push(vec![TagInput::title("x")], EntryOptions::default());
    let mut dom = LiveDom::new();
    let mut reconciler = DomReconciler::new();
    sync(&head, &mut reconciler, &mut dom);
    let version = dom.version();
    let outcome = sync(&head, &mut reconciler, &mut dom);
    assert!(outcome.skipped);
    assert_eq!(dom.version(), version);
}

#[test]
fn scripts_execute_at_most_once_across_unrelated_updates() {
    let head = Head::client();
    head.push(
        vec![TagInput::script_src("/analytics.js").attr("async", true)],
        EntryOptions::default(),
    );
    let other = head.push(vec![TagInput::meta_name("a", "0")], EntryOptions::default());
    let mut dom = LiveDom::new();
    let mut reconciler = DomReconciler::new();
    sync(&head, &mut reconciler, &mut dom);

    for i in 1..4 {
        head.update(other, vec![TagInput::meta_name("a", i.to_string())]);
        sync(&head, &mut reconciler, &mut dom);
    }
    // A second declaration of the same script takes over the slot unchanged.
    head.push(
        vec![TagInput::script_src("/analytics.js").attr("async", true)],
        EntryOptions::default(),
    );
    let outcome = sync(&head, &mut reconciler, &mut dom);
    assert!(outcome.patches.is_empty());
    assert_eq!(dom.execution_count("/analytics.js"), 1);
}

#[test]
fn script_source_change_executes_the_new_version() {
    let head = Head::client();
    let id = head.push(
        vec![TagInput::script_src("/v1.js").key("widget")],
        EntryOptions::default(),
    );
    let mut dom = LiveDom::new();
    let mut reconciler = DomReconciler::new();
    sync(&head, &mut reconciler, &mut dom);

    head.update(
        id,
        vec![TagInput::script_src("/v1.js").key("widget").attr("data-mode", "lite")],
    );
    sync(&head, &mut reconciler, &mut dom);
    assert_eq!(dom.execution_count("/v1.js"), 1);

    head.update(id, vec![TagInput::script_src("/v2.js").key("widget")]);
    let outcome = sync(&head, &mut reconciler, &mut dom);
    assert_eq!(outcome.stats.replaced, 1);
    assert_eq!(dom.execution_count("/v1.js"), 1);
    assert_eq!(dom.execution_count("/v2.js"), 1);
    assert_eq!(
        dom.outline(DocumentRoot::Head),
        vec!["<script src=\"/v2.js\" data-head=\"script:key:widget\"></script>"]
    );
}

#[test]
fn unowned_markup_is_never_touched() {
    let mut dom = LiveDom::new();
    dom.append_element(
        DocumentRoot::Head,
        "meta",
        vec![attr("name", "viewport"), attr("content", "width=device-width")],
        None,
    )
    .unwrap();
    dom.append_element(DocumentRoot::Body, "div", vec![attr("id", "app")], None)
        .unwrap();
    let pristine = dom.render();

    let head = Head::client();
    let mut reconciler = DomReconciler::new();
    // Same identity as the unowned viewport meta; only the owned copy changes.
    let a = head.push(
        vec![
            TagInput::meta_name("viewport", "width=500"),
            TagInput::title("t"),
            TagInput::new("noscript").text("js off").zone(Zone::BodyOpen),
        ],
        EntryOptions::default(),
    );
    let b = head.push(
        vec![TagInput::new("script").inner_html("boot()").zone(Zone::BodyClose)],
        EntryOptions::default(),
    );
    sync(&head, &mut reconciler, &mut dom);
    assert_eq!(
        dom.outline(DocumentRoot::Body),
        vec![
            "<noscript data-head=\"\">js off</noscript>",
            "<div id=\"app\"></div>",
            "<script data-head=\"\">boot()</script>",
        ]
    );

    head.remove(a);
    head.remove(b);
    sync(&head, &mut reconciler, &mut dom);
    assert_eq!(dom.render(), pristine);
    assert_eq!(reconciler.owned_len(), 0);
}

#[test]
fn root_attributes_restore_pre_existing_values() {
    let mut dom = LiveDom::new();
    dom.set_root_attribute(DocumentRoot::Body, "class", Some("js".into()))
        .unwrap();
    let body = dom.root(DocumentRoot::Body).unwrap();
    let html = dom.root(DocumentRoot::Html).unwrap();

    let head = Head::client();
    let mut reconciler = DomReconciler::new();
    let id = head.push(
        vec![
            TagInput::body_attrs().attr("class", "dark"),
            TagInput::html_attrs().attr("lang", "de"),
        ],
        EntryOptions::default(),
    );
    sync(&head, &mut reconciler, &mut dom);
    assert_eq!(dom.attribute(body, "class"), Some(Some("dark")));
    assert_eq!(dom.attribute(html, "lang"), Some(Some("de")));

    head.update(id, vec![TagInput::body_attrs().attr("class", "light")]);
    sync(&head, &mut reconciler, &mut dom);
    assert_eq!(dom.attribute(body, "class"), Some(Some("light")));
    assert_eq!(dom.attribute(html, "lang"), None);

    head.remove(id);
    sync(&head, &mut reconciler, &mut dom);
    assert_eq!(dom.attribute(body, "class"), Some(Some("js")));
}

#[test]
fn anchored_reorder_moves_without_recreating() {
    let head = Head::client();
    let id = head.push(
        vec![TagInput::meta_name("a", "1"), TagInput::meta_name("b", "2")],
        EntryOptions::default(),
    );
    let mut dom = LiveDom::new();
    let mut reconciler = DomReconciler::new();
    sync(&head, &mut reconciler, &mut dom);

    head.update(
        id,
        vec![
            TagInput::meta_name("a", "1"),
            TagInput::meta_name("b", "2").before("meta:name:a"),
        ],
    );
    let outcome = sync(&head, &mut reconciler, &mut dom);
    assert_eq!(outcome.stats.moved, 1);
    assert_eq!(outcome.stats.created, 0);
    assert_eq!(
        dom.outline(DocumentRoot::Head),
        vec![
            "<meta name=\"b\" content=\"2\" data-head=\"meta:name:b\">",
            "<meta name=\"a\" content=\"1\" data-head=\"meta:name:a\">",
        ]
    );
}

fn storefront(head: &Head) {
    head.push(
        vec![
            TagInput::title("Shop"),
            TagInput::meta_name("description", "Everything"),
            TagInput::script_src("/app.js").zone(Zone::BodyClose),
        ],
        EntryOptions::default(),
    );
}

#[test]
fn client_render_matches_server_markup() {
    let server = Head::new(HeadOptions {
        ssr: SsrOptions {
            hydration_markers: true,
            ..SsrOptions::default()
        },
        ..HeadOptions::server()
    });
    storefront(&server);
    let ssr = render_ssr_head(&server);

    let client = Head::client();
    storefront(&client);
    let mut dom = LiveDom::new();
    sync(&client, &mut DomReconciler::new(), &mut dom);
    assert_eq!(dom.outline(DocumentRoot::Head).join("\n"), ssr.head_tags);
    assert_eq!(dom.outline(DocumentRoot::Body).join("\n"), ssr.body_tags);
}

#[test]
fn hydration_adopts_server_rendered_elements() {
    // The document as the browser parsed it from marked server output.
    let mut dom = LiveDom::new();
    dom.append_element(
        DocumentRoot::Head,
        "title",
        vec![attr("data-head", "title")],
        Some(TagContent::Text("Shop".into())),
    )
    .unwrap();
    dom.append_element(
        DocumentRoot::Head,
        "meta",
        vec![
            attr("name", "description"),
            attr("content", "Everything"),
            attr("data-head", "meta:name:description"),
        ],
        None,
    )
    .unwrap();
    dom.append_element(
        DocumentRoot::Head,
        "meta",
        vec![attr("name", "stale"), attr("data-head", "meta:name:stale")],
        None,
    )
    .unwrap();
    dom.append_element(
        DocumentRoot::Body,
        "script",
        vec![attr("src", "/app.js"), attr("data-head", "script:src:/app.js")],
        None,
    )
    .unwrap();
    assert_eq!(dom.execution_count("/app.js"), 1);

    let client = Head::client();
    storefront(&client);
    let mut reconciler = DomReconciler::new();
    assert_eq!(reconciler.adopt(&dom), 4);
    let outcome = sync(&client, &mut reconciler, &mut dom);
    assert_eq!(outcome.stats.adopted, 3);
    assert_eq!(outcome.stats.created, 0);
    assert_eq!(outcome.stats.removed, 1);
    assert_eq!(dom.marked(DocumentRoot::Head).len(), 2);
    assert_eq!(dom.execution_count("/app.js"), 1);

    // Later updates patch the adopted elements in place.
    client.push(vec![TagInput::title("Cart")], EntryOptions::default());
    let outcome = sync(&client, &mut reconciler, &mut dom);
    assert_eq!(outcome.stats.updated, 1);
    assert_eq!(dom.outline(DocumentRoot::Head)[0], "<title data-head=\"title\">Cart</title>");
}

#[test]
fn externally_removed_elements_are_recreated() {
    let head = Head::client();
    let layout = head.push(vec![TagInput::meta_name("b", "1")], EntryOptions::default());
    let mut dom = LiveDom::new();
    let mut reconciler = DomReconciler::new();
    sync(&head, &mut reconciler, &mut dom);

    // Third-party code drops the owned element behind the reconciler's back.
    let b = dom.marked(DocumentRoot::Head)[0];
    dom.apply(&[DomPatch::RemoveNode { key: b }]).unwrap();

    head.push(vec![TagInput::meta_name("c", "2")], EntryOptions::default());
    for _ in 0..3 {
        sync(&head, &mut reconciler, &mut dom);
        head.update(layout, vec![TagInput::meta_name("b", "1")]);
    }
    assert_eq!(
        dom.outline(DocumentRoot::Head),
        vec![
            "<meta name=\"b\" content=\"1\" data-head=\"meta:name:b\">",
            "<meta name=\"c\" content=\"2\" data-head=\"meta:name:c\">",
        ]
    );
    assert_eq!(reconciler.owned_len(), 2);
}

/// Applies only the first `accept` patches of the next batch, then rejects it.
struct InterruptedDom {
    inner: LiveDom,
    accept: Option<usize>,
}

impl LiveDocument for InterruptedDom {
    fn root(&self, root: DocumentRoot) -> Option<PatchKey> {
        self.inner.root(root)
    }

    fn children(&self, parent: PatchKey) -> Vec<PatchKey> {
        self.inner.children(parent)
    }

    fn element(&self, key: PatchKey) -> Option<ElementView<'_>> {
        self.inner.element(key)
    }

    fn allocate_key(&mut self) -> PatchKey {
        self.inner.allocate_key()
    }

    fn apply(&mut self, patches: &[DomPatch]) -> Result<(), DomPatchError> {
        match self.accept.take() {
            Some(accept) => {
                self.inner.apply(&patches[..accept.min(patches.len())])?;
                Err(DomPatchError::MissingKey(PatchKey(u32::MAX)))
            }
            None => self.inner.apply(patches),
        }
    }
}

#[test]
fn partially_applied_batch_converges_without_duplicates() {
    let head = Head::client();
    head.push(
        vec![
            TagInput::title("Shop"),
            TagInput::meta_name("a", "1"),
            TagInput::script_src("/app.js").zone(Zone::BodyClose),
        ],
        EntryOptions::default(),
    );
    let mut dom = InterruptedDom {
        inner: LiveDom::new(),
        accept: Some(4),
    };
    let mut reconciler = DomReconciler::new();
    let err = reconciler.reconcile(&head.resolve(), &mut dom).unwrap_err();
    assert!(matches!(err, ReconcileError::Patch(DomPatchError::MissingKey(_))));
    assert_eq!(dom.inner.marked(DocumentRoot::Head).len(), 2);
    assert!(dom.inner.marked(DocumentRoot::Body).is_empty());

    for _ in 0..3 {
        reconciler.reconcile(&head.resolve(), &mut dom).unwrap();
    }
    assert_eq!(
        dom.inner.outline(DocumentRoot::Head),
        vec![
            "<title data-head=\"title\">Shop</title>",
            "<meta name=\"a\" content=\"1\" data-head=\"meta:name:a\">",
        ]
    );
    assert_eq!(
        dom.inner.outline(DocumentRoot::Body),
        vec!["<script src=\"/app.js\" data-head=\"script:src:/app.js\"></script>"]
    );
    assert_eq!(dom.inner.execution_count("/app.js"), 1);
    assert_eq!(reconciler.owned_len(), 3);
}
