//! Localized response messages

use std::collections::HashMap;

use rusqlite::{params, Connection};

use crate::error::ParamError;

/// All messages of one (category, language), keyed by code
pub fn load_messages(
    conn: &Connection,
    category: &str,
    language: &str,
) -> Result<HashMap<String, String>, ParamError> {
    let mut stmt = conn.prepare(
        "SELECT code_message, message FROM response_message_translations \
         WHERE category = ? AND language_code = ?",
    )?;
    let messages = stmt
        .query_map(params![category, language], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<HashMap<String, String>, _>>()?;
    Ok(messages)
}

pub fn upsert_message(
    conn: &Connection,
    code: &str,
    category: &str,
    language: &str,
    message: &str,
) -> Result<(), ParamError> {
    conn.execute(
        r#"
        INSERT INTO response_message_translations (code_message, category, language_code, message)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(code_message, category, language_code) DO UPDATE SET message = excluded.message
        "#,
        params![code, category, language, message],
    )?;
    Ok(())
}
