/// Why a script never produced its API. Cloned to every awaiter of the
/// shared load future.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("script failed to load: {0}")]
    LoadFailed(String),
    #[error("script loaded but its API could not be resolved")]
    ApiUnavailable,
    #[error("script was removed before it loaded")]
    Removed,
    #[error("script `{key}` is already declared with a different API type")]
    ApiMismatch { key: String },
    #[error("script instance was dropped before it settled")]
    Dropped,
}
