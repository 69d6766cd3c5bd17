use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use crate::models::table::{ColumnSpec, TableSchema};
use crate::tables_engine::ddl::map_type;

#[derive(PartialEq, Eq)]
enum ScanState {
    Normal,
    Single,
    Double,
    Dollar,
}

fn matches_at(chars: &[char], i: usize, pat: &[char]) -> bool {
    if i + pat.len() > chars.len() {
        return false;
    }
    chars[i..i + pat.len()] == *pat
}

/// Splits a multi-statement SQL string on unquoted `;`, respecting
/// single-quoted strings, double-quoted identifiers, dollar-quoted strings
/// (`$$...$$` and `$tag$...$tag$`), and doubled-quote escapes within
/// strings/identifiers. This is a small explicit state machine over the
/// character stream rather than a regex, per the design note: regexes
/// cannot track the open/close pairing that dollar-quoting and nested
/// parens both require. Leading/trailing whitespace is trimmed from each
/// statement and empty statements are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let chars: Vec<char> = sql.chars().collect();
    let n = chars.len();
    let mut i = 0;
    let mut state = ScanState::Normal;
    let mut dollar_close: Vec<char> = Vec::new();
    let mut current = String::new();
    let mut statements = Vec::new();

    while i < n {
        let c = chars[i];
        match state {
            ScanState::Normal => match c {
                '\'' => {
                    state = ScanState::Single;
                    current.push(c);
                    i += 1;
                }
                '"' => {
                    state = ScanState::Double;
                    current.push(c);
                    i += 1;
                }
                '$' => {
                    if let Some((tag_len, close)) = match_dollar_open(&chars, i) {
                        current.extend(&chars[i..i + tag_len]);
                        dollar_close = close;
                        state = ScanState::Dollar;
                        i += tag_len;
                    } else {
                        current.push(c);
                        i += 1;
                    }
                }
                ';' => {
                    let trimmed = current.trim().to_string();
                    if !trimmed.is_empty() {
                        statements.push(trimmed);
                    }
                    current.clear();
                    i += 1;
                }
                _ => {
                    current.push(c);
                    i += 1;
                }
            },
            ScanState::Single => {
                if c == '\'' {
                    if matches_at(&chars, i, &['\'', '\'']) {
                        current.push('\'');
                        current.push('\'');
                        i += 2;
                    } else {
                        current.push(c);
                        state = ScanState::Normal;
                        i += 1;
                    }
                } else {
                    current.push(c);
                    i += 1;
                }
            }
            ScanState::Double => {
                if c == '"' {
                    if matches_at(&chars, i, &['"', '"']) {
                        current.push('"');
                        current.push('"');
                        i += 2;
                    } else {
                        current.push(c);
                        state = ScanState::Normal;
                        i += 1;
                    }
                } else {
                    current.push(c);
                    i += 1;
                }
            }
            ScanState::Dollar => {
                if c == '$' && matches_at(&chars, i, &dollar_close) {
                    current.extend(dollar_close.iter());
                    i += dollar_close.len();
                    state = ScanState::Normal;
                } else {
                    current.push(c);
                    i += 1;
                }
            }
        }
    }

    let trimmed = current.trim().to_string();
    if !trimmed.is_empty() {
        statements.push(trimmed);
    }
    statements
}

/// Recognizes a dollar-quote opener (`$$` or `$tag$`) starting at `chars[i]`.
/// Returns `(opener_len, closer_chars)` so the caller can both skip past
/// the opener and know what to scan for to close it.
fn match_dollar_open(chars: &[char], i: usize) -> Option<(usize, Vec<char>)> {
    let n = chars.len();
    let mut j = i + 1;
    while j < n && (chars[j].is_alphanumeric() || chars[j] == '_') {
        j += 1;
    }
    if j < n && chars[j] == '$' {
        let tag_len = j - i + 1;
        let mut closer = vec!['$'];
        closer.extend(&chars[i + 1..j]);
        closer.push('$');
        Some((tag_len, closer))
    } else {
        None
    }
}

/// Splits a column-definition list on top-level commas — i.e. commas not
/// nested inside `DECIMAL(10,2)`-style type parens or quoted strings.
/// Bracket-depth counting, not regex, per the design note: regex cannot
/// express "commas at paren depth zero" for arbitrarily nested types.
fn split_top_level(s: &str, sep: char) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let n = chars.len();
    let mut depth = 0i32;
    let mut in_single = false;
    let mut current = String::new();
    let mut parts = Vec::new();
    let mut i = 0;
    while i < n {
        let c = chars[i];
        if in_single {
            current.push(c);
            if c == '\'' {
                if matches_at(&chars, i, &['\'', '\'']) {
                    current.push('\'');
                    i += 2;
                    continue;
                }
                in_single = false;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' => {
                in_single = true;
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            c if c == sep && depth == 0 => {
                parts.push(current.trim().to_string());
                current = String::new();
            }
            c => current.push(c),
        }
        i += 1;
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Locates the index just past the matching close-paren for the open-paren
/// at `open_idx`, counting depth and respecting single-quoted strings.
fn find_matching_paren(chars: &[char], open_idx: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_single = false;
    let mut i = open_idx;
    while i < chars.len() {
        let c = chars[i];
        if in_single {
            if c == '\'' {
                if matches_at(chars, i, &['\'', '\'']) {
                    i += 2;
                    continue;
                }
                in_single = false;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' => in_single = true,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

static CREATE_TABLE_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?"?(?P<name>[A-Za-z_][A-Za-z0-9_]*)"?\s*\("#).unwrap()
});

static CONSTRAINT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*(PRIMARY\s+KEY|FOREIGN\s+KEY|UNIQUE|CHECK|CONSTRAINT)\b").unwrap());

static COLUMN_DEF: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?is)^"?(?P<name>[A-Za-z_][A-Za-z0-9_]*)"?\s+(?P<type>[A-Za-z][A-Za-z0-9]*)\s*(?:\([^)]*\))?"#).unwrap());

/// Finds every `CREATE TABLE` statement's name and column schema, for
/// registry reconciliation. The closing paren of the column list is found
/// by bracket-depth counting (not regex) because types like
/// `DECIMAL(10,2)` and constraints like `FOREIGN KEY(...) REFERENCES
/// t(id)` both nest parens inside the outer list.
pub fn extract_create_tables(statements: &[String]) -> Vec<(String, TableSchema)> {
    let mut out = Vec::new();
    for stmt in statements {
        let Some(caps) = CREATE_TABLE_HEAD.captures(stmt) else { continue };
        let name = caps.name("name").unwrap().as_str().to_lowercase();
        let open_paren_offset = caps.get(0).unwrap().end() - 1;

        let chars: Vec<char> = stmt.chars().collect();
        let Some(close_idx) = find_matching_paren(&chars, open_paren_offset) else { continue };
        let columns_str: String = chars[open_paren_offset + 1..close_idx].iter().collect();

        let mut schema: TableSchema = BTreeMap::new();
        for col_def in split_top_level(&columns_str, ',') {
            if col_def.is_empty() || CONSTRAINT_PREFIX.is_match(&col_def) {
                continue;
            }
            let Some(caps) = COLUMN_DEF.captures(&col_def) else { continue };
            let col_name = caps.name("name").unwrap().as_str().to_lowercase();
            let raw_type = caps.name("type").unwrap().as_str();
            let nullable = !col_def.to_lowercase().contains("not null");
            schema.insert(
                col_name,
                ColumnSpec {
                    type_name: map_type(raw_type),
                    nullable,
                    default: None,
                },
            );
        }

        if !schema.is_empty() {
            out.push((name, schema));
        }
    }
    out
}

static DROP_TABLE_HEAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)DROP\s+TABLE\s+(?:IF\s+EXISTS\s+)?(?P<rest>.+)$").unwrap());
static TABLE_NAME_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^"?(?P<name>[A-Za-z_][A-Za-z0-9_]*)"?$"#).unwrap());

/// Finds every dropped table name across all `DROP TABLE` statements,
/// including the comma-separated multi-table form (`DROP TABLE a, b;`).
pub fn extract_drop_tables(statements: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for stmt in statements {
        let Some(caps) = DROP_TABLE_HEAD.captures(stmt) else { continue };
        let rest = caps.name("rest").unwrap().as_str();
        let rest = rest
            .split_whitespace()
            .take_while(|w| !w.eq_ignore_ascii_case("cascade") && !w.eq_ignore_ascii_case("restrict"))
            .collect::<Vec<_>>()
            .join(" ");
        for name in split_top_level(&rest, ',') {
            if let Some(caps) = TABLE_NAME_TOKEN.captures(name.trim()) {
                out.push(caps.name("name").unwrap().as_str().to_lowercase());
            }
        }
    }
    out
}

/// Reserved/system tables the SQL console still executes against but never
/// reconciles into the registry.
pub const SYSTEM_TABLES: &[&str] = &[
    "system_config",
    "users",
    "tables",
    "sql_history",
    "sql_snippets",
    "buckets",
    "files",
    "functions",
    "function_executions",
    "function_logs",
    "webhooks",
    "webhook_deliveries",
    "refresh_tokens",
];

/// Tables a non-read SQL console statement may never target, regardless of
/// the caller's role.
pub const PROTECTED_TABLES: &[&str] = &["system_config", "sql_history", "sql_snippets"];

static DANGEROUS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bpg_read_file\b",
        r"(?i)\bpg_write_file\b",
        r"(?i)\bpg_ls_dir\b",
        r"(?i)\blo_import\b",
        r"(?i)\blo_export\b",
        r"(?i)\bcopy\s+.*\s+to\s+program\b",
        r"(?i)\bcopy\s+.*\s+from\s+program\b",
        r"(?i)\bexecute\s+format\b",
        r";\s*--",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static MODIFICATION_HEAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(insert\s+into|update|delete\s+from|drop\s+table|truncate)\s+").unwrap());

/// Rejects denylisted SQL patterns (privileged file/program I/O,
/// comment-based injection sentinels) and modifications targeting a fixed
/// set of protected system tables. Returns an error message to surface as
/// `BadInput` when the query should not run at all.
pub fn validate_query_security(query: &str) -> Option<String> {
    for pattern in DANGEROUS_PATTERNS.iter() {
        if pattern.is_match(query) {
            return Some("query contains a prohibited pattern".to_string());
        }
    }

    let lower = query.to_lowercase();
    if let Some(m) = MODIFICATION_HEAD.find(&lower) {
        let remaining = lower[m.end()..].trim_start();
        for protected in PROTECTED_TABLES {
            if remaining.starts_with(protected) {
                return Some(format!("cannot modify protected system table: {protected}"));
            }
        }
    }
    None
}

pub fn is_read_only_query(query: &str) -> bool {
    let lower = query.trim().to_lowercase();
    lower.starts_with("select")
        || lower.starts_with("explain")
        || lower.starts_with("show")
        || lower.starts_with("describe")
        || lower.starts_with("with")
}
