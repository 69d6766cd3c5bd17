use crate::error::AppError;
use crate::models::table::{ColumnAdd, ColumnSpec, ColumnUpdate, TableSchema};

/// Quotes a SQL identifier, doubling any embedded double-quote per
/// Postgres's own escaping rule. Every identifier this engine emits goes
/// through here instead of being interpolated bare — column names come
/// from caller-supplied JSON keys and are not restricted to the same
/// identifier shape the table-name validator enforces.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Maps a declared logical column type to its physical Postgres type.
/// Unrecognized types pass through uppercase verbatim,
/// matching the source's `type_mapping.get(col_type, col_type)` fallback —
/// an operator who types a real Postgres type name that isn't in the table
/// still gets a working column rather than a rejected request.
pub fn map_type(declared: &str) -> String {
    let upper = declared.trim().to_uppercase();
    match upper.as_str() {
        "TEXT" => "TEXT",
        "STRING" | "VARCHAR" => "VARCHAR(255)",
        "INTEGER" | "INT" => "INTEGER",
        "BIGINT" => "BIGINT",
        "SMALLINT" => "INTEGER",
        "DECIMAL" | "NUMERIC" => "DECIMAL(10,2)",
        "FLOAT" | "REAL" | "DOUBLE" => "DOUBLE PRECISION",
        "BOOLEAN" | "BOOL" => "BOOLEAN",
        "DATE" => "DATE",
        "TIMESTAMP" | "DATETIME" => "TIMESTAMP WITH TIME ZONE",
        "JSON" | "JSONB" => "JSONB",
        "UUID" => "UUID",
        other => return other.to_string(),
    }
    .to_string()
}

/// True when the mapped physical type is text-like, i.e. a valid target
/// for an `ILIKE` full-text search filter on row data.
pub fn is_text_like(physical_type: &str) -> bool {
    physical_type == "TEXT" || physical_type.starts_with("VARCHAR")
}

fn column_def_sql(name: &str, type_name: &str, nullable: bool, default: Option<&serde_json::Value>) -> String {
    let mut sql = format!("{} {}", quote_ident(name), map_type(type_name));
    if !nullable {
        sql.push_str(" NOT NULL");
    }
    if let Some(d) = default {
        sql.push_str(&format!(" DEFAULT {}", default_literal(d)));
    }
    sql
}

/// Renders a JSON default value as a SQL literal. Scalars are quoted as
/// text/numeric literals; objects/arrays are not valid column defaults for
/// the scalar types this engine creates and are rejected upstream by the
/// schema deserializer's own typing, so this only needs to handle the
/// JSON scalar cases.
fn default_literal(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

/// Builds `CREATE TABLE IF NOT EXISTS "name" (...)` from a JSON schema. An
/// empty schema defaults to a single `id SERIAL PRIMARY KEY` column.
pub fn build_create_table_sql(table_name: &str, schema: &TableSchema) -> String {
    if schema.is_empty() {
        return format!(
            "CREATE TABLE IF NOT EXISTS {} (id SERIAL PRIMARY KEY)",
            quote_ident(table_name)
        );
    }
    let columns: Vec<String> = schema
        .iter()
        .map(|(name, col)| column_def_sql(name, &col.type_name, col.nullable, col.default.as_ref()))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table_name),
        columns.join(", ")
    )
}

pub fn build_drop_table_sql(table_name: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(table_name))
}

pub fn build_add_column_sql(table_name: &str, col: &ColumnAdd) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {}",
        quote_ident(table_name),
        column_def_sql(&col.name, &col.type_name, col.nullable, col.default.as_ref())
    )
}

pub fn build_drop_column_sql(table_name: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN {}",
        quote_ident(table_name),
        quote_ident(column)
    )
}

/// A column mutation (`PATCH /tables/{id}/columns/{name}`) can combine a
/// rename, a type change, nullability, and a default change in one call.
/// Each aspect that is present becomes its own `ALTER TABLE` clause,
/// executed in sequence so a partial failure rolls back cleanly within the
/// caller's transaction.
pub fn build_column_update_statements(table_name: &str, column: &str, update: &ColumnUpdate) -> Vec<String> {
    let mut statements = Vec::new();
    let table = quote_ident(table_name);

    if let Some(type_name) = &update.type_name {
        statements.push(format!(
            "ALTER TABLE {table} ALTER COLUMN {} TYPE {} USING {}::{}",
            quote_ident(column),
            map_type(type_name),
            quote_ident(column),
            map_type(type_name)
        ));
    }

    if let Some(nullable) = update.nullable {
        let clause = if nullable { "DROP NOT NULL" } else { "SET NOT NULL" };
        statements.push(format!("ALTER TABLE {table} ALTER COLUMN {} {clause}", quote_ident(column)));
    }

    if update.drop_default {
        statements.push(format!("ALTER TABLE {table} ALTER COLUMN {} DROP DEFAULT", quote_ident(column)));
    } else if let Some(default) = &update.default {
        statements.push(format!(
            "ALTER TABLE {table} ALTER COLUMN {} SET DEFAULT {}",
            quote_ident(column),
            default_literal(default)
        ));
    }

    if let Some(new_name) = &update.new_name {
        statements.push(format!(
            "ALTER TABLE {table} RENAME COLUMN {} TO {}",
            quote_ident(column),
            quote_ident(new_name)
        ));
    }

    statements
}

/// Applies a column mutation to the registry's cached `table_schema` JSON
/// so the physical table and the registry description never drift.
pub fn apply_schema_update(schema: &mut TableSchema, column: &str, update: &ColumnUpdate) -> Result<(), AppError> {
    let mut spec = schema
        .get(column)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("column '{column}' not found in schema")))?;

    if let Some(type_name) = &update.type_name {
        spec.type_name = type_name.clone();
    }
    if let Some(nullable) = update.nullable {
        spec.nullable = nullable;
    }
    if update.drop_default {
        spec.default = None;
    } else if let Some(default) = &update.default {
        spec.default = Some(default.clone());
    }

    schema.remove(column);
    let key = update.new_name.clone().unwrap_or_else(|| column.to_string());
    schema.insert(key, spec);
    Ok(())
}

pub fn add_column_to_schema(schema: &mut TableSchema, col: &ColumnAdd) {
    schema.insert(
        col.name.clone(),
        ColumnSpec {
            type_name: col.type_name.clone(),
            nullable: col.nullable,
            default: col.default.clone(),
        },
    );
}
