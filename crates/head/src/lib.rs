pub mod config;
pub mod context;
pub mod debug;
pub mod dedup;
pub mod dom_patch;
pub mod escape;
pub mod normalize;
pub mod reconcile;
pub mod registry;
pub mod resolve;
pub mod ssr;

mod template;
mod types;

pub use config::{EntryConfig, HeadManifest, load_into};
pub use context::{Head, HeadOptions};
pub use debug::outline_resolved;
pub use dedup::{DedupKey, dedup_key};
pub use dom_patch::{DomAttribute, DomPatch, DomPatchError, PatchKey};
pub use normalize::{TagError, normalize_tag};
pub use reconcile::{
    DocumentRoot, DomReconciler, ElementView, LiveDocument, OWNED_MARKER, ReconcileError,
    ReconcileOutcome, ReconcileStats,
};
pub use registry::{Entry, EntryOptions, Mode, Priority, Registry};
pub use resolve::{
    Diagnostic, ResolveIssue, ResolvedTag, ResolvedTags, Resolver, TagIdentity, resolve_entries,
};
pub use ssr::{SsrHead, SsrOptions, inject_head, render_attributes, render_ssr_head, render_tag, render_tags};
pub use template::TemplateParams;
pub use types::{Anchor, AttrRender, AttrValue, Tag, TagContent, TagInput, Zone};
