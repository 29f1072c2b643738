//! Column name canonicalization
//!
//! Raw header text from source files is rewritten into a stable identifier
//! that serves as the column key everywhere downstream (schema inference,
//! table DDL, row loading).

/// Name of the synthetic identity column generated by the store
pub const IDENTITY_COLUMN: &str = "id";

/// Canonical key shared by every foreign game identity spelling
pub const GAME_ID_COLUMN: &str = "game_id";

/// Canonical spellings treated as foreign identity columns
pub const IDENTITY_ALIASES: [&str; 3] = ["id", "gameid", "game_id"];

/// Map a raw column name to its canonical form.
///
/// Lowercases, turns spaces and hyphens into `_`, and strips parentheses.
/// Total and idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter(|c| *c != '(' && *c != ')')
        .map(|c| match c {
            ' ' | '-' => '_',
            other => other,
        })
        .collect()
}

/// True if the (raw or canonical) name is one of the identity aliases
pub fn is_identity_alias(name: &str) -> bool {
    let canonical = normalize(name);
    IDENTITY_ALIASES.contains(&canonical.as_str())
}

/// Column identity used by inference and loading.
///
/// Same as [`normalize`], except `gameid` folds onto `game_id` so that
/// "GameID" and "Game ID" land in one column.
pub fn canonical_key(raw: &str) -> String {
    let canonical = normalize(raw);
    if canonical == "gameid" {
        GAME_ID_COLUMN.to_string()
    } else {
        canonical
    }
}
