use bridge_core::CursorState;

use crate::Db;
use crate::error::Result;

pub const CURSOR_DOCUMENT_ID: &str = "usage-bridge-cursor";

impl Db {
    /// Loads the cursor document; a missing document means "start from the
    /// beginning of the log" and yields `None`.
    pub fn load_cursor_state(&self) -> Result<Option<CursorState>> {
        let Some(doc) = self.get_document(CURSOR_DOCUMENT_ID)? else {
            return Ok(None);
        };
        let mut state: CursorState = serde_json::from_str(&doc.body)?;
        state.revision = Some(doc.rev);
        Ok(Some(state))
    }

    /// Persists the four cursor fields guarded by `state.revision` and returns
    /// the new revision. The caller keeps the returned token for the next write.
    pub fn save_cursor_state(&mut self, state: &CursorState) -> Result<String> {
        let body = serde_json::to_string(state)?;
        self.put_document(CURSOR_DOCUMENT_ID, &body, state.revision.as_deref())
    }
}
