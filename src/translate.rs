//! Translation cache for response codes
//!
//! Each (category, language) table is read from the database the first
//! time it is needed and kept for the life of the cache. Unknown codes
//! translate to themselves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::db::{translations, ParamDb};
use crate::error::{ErrorBody, ParamError};

/// Translation category of this service's messages
pub const CATEGORY: &str = "parameters";

type Table = Arc<HashMap<String, String>>;

/// Lazily loaded message tables
pub struct TranslationCache {
    db: Arc<ParamDb>,
    default_language: String,
    tables: Mutex<HashMap<(String, String), Table>>,
}

impl TranslationCache {
    pub fn new(db: Arc<ParamDb>, default_language: impl Into<String>) -> Self {
        Self {
            db,
            default_language: default_language.into(),
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Message for `code` in `language`, or the code itself
    pub fn translate(&self, code: &str, language: &str) -> Result<String, ParamError> {
        let table = self.table(CATEGORY, language)?;
        Ok(table.get(code).cloned().unwrap_or_else(|| code.to_string()))
    }

    /// Replace an error body's message with its translation, when one exists
    pub fn localize(&self, body: &ErrorBody, language: &str) -> ErrorBody {
        match self.table(CATEGORY, language) {
            Ok(table) => ErrorBody {
                code: body.code.clone(),
                message: table.get(&body.code).cloned().unwrap_or_else(|| body.message.clone()),
            },
            Err(e) => {
                warn!(code = %body.code, "Translation unavailable: {}", e);
                body.clone()
            }
        }
    }

    /// Forget loaded tables so the next lookup reloads them
    pub fn invalidate(&self) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.clear();
        }
    }

    fn table(&self, category: &str, language: &str) -> Result<Table, ParamError> {
        let language = self.normalize(language);
        let key = (category.to_string(), language);

        let mut tables = self
            .tables
            .lock()
            .map_err(|e| ParamError::Internal(format!("Lock poisoned: {}", e)))?;

        if let Some(table) = tables.get(&key) {
            return Ok(Arc::clone(table));
        }

        let loaded = self
            .db
            .with_read_conn(|conn| translations::load_messages(conn, &key.0, &key.1))?;
        debug!(category = %key.0, language = %key.1, messages = loaded.len(), "Loaded translations");

        let table = Arc::new(loaded);
        tables.insert(key, Arc::clone(&table));
        Ok(table)
    }

    /// First tag of an Accept-Language style value, lower-cased
    fn normalize(&self, language: &str) -> String {
        let tag = language
            .split([',', ';'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if tag.is_empty() {
            self.default_language.clone()
        } else {
            tag
        }
    }
}
