// Statement builders for catalog discovery and acceleration operations
use crate::error::CatalogError;
use crate::models::{AccelerationKind, AccelerationOperation, CachedAcceleration, LoadCacheType};

/// Wrap an identifier in backticks unless it is already quoted.
pub fn add_backticks_if_needed(identifier: &str) -> String {
    if identifier.len() >= 2 && identifier.starts_with('`') && identifier.ends_with('`') {
        identifier.to_string()
    } else {
        format!("`{}`", identifier)
    }
}

fn required<'a>(value: Option<&'a str>, what: &str, kind: LoadCacheType) -> Result<&'a str, CatalogError> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| {
        CatalogError::Validation(format!("{} is required to load {}", what, kind.as_str()))
    })
}

/// Build the discovery statement for a load kind.
pub fn create_load_query(
    kind: LoadCacheType,
    data_source_name: &str,
    database_name: Option<&str>,
    table_name: Option<&str>,
) -> Result<String, CatalogError> {
    let data_source = add_backticks_if_needed(data_source_name);

    let query = match kind {
        LoadCacheType::Databases => format!("SHOW SCHEMAS IN {}", data_source),
        LoadCacheType::Tables => {
            let database = required(database_name, "Database name", kind)?;
            format!(
                "SHOW TABLE EXTENDED IN {}.{} LIKE '*'",
                data_source,
                add_backticks_if_needed(database)
            )
        }
        LoadCacheType::Accelerations => format!("SHOW FLINT INDEX in {}", data_source),
        LoadCacheType::TableColumns => {
            let database = required(database_name, "Database name", kind)?;
            let table = required(table_name, "Table name", kind)?;
            format!(
                "DESC {}.{}.{}",
                data_source,
                add_backticks_if_needed(database),
                add_backticks_if_needed(table)
            )
        }
    };

    Ok(query)
}

/// Build the DDL statement running `operation` against an acceleration.
///
/// Fails with `UnsupportedOperation` when the kind has no statement form or
/// a field the statement needs is missing.
pub fn generate_acceleration_operation_query(
    acceleration: &CachedAcceleration,
    data_source_name: &str,
    operation: AccelerationOperation,
) -> Result<String, CatalogError> {
    let keyword = operation.keyword();

    match &acceleration.kind {
        AccelerationKind::Skipping => {
            let database = require_field(&acceleration.database, "Database", "skipping index")?;
            let table = require_field(&acceleration.table, "Table", "skipping index")?;
            Ok(format!(
                "{} SKIPPING INDEX ON {}.{}.{}",
                keyword, data_source_name, database, table
            ))
        }
        AccelerationKind::Covering => {
            let database = require_field(&acceleration.database, "Database", "covering index")?;
            let table = require_field(&acceleration.table, "Table", "covering index")?;
            let index = require_field(&acceleration.index_name, "Index name", "covering index")?;
            Ok(format!(
                "{} INDEX {} ON {}.{}.{}",
                keyword, index, data_source_name, database, table
            ))
        }
        AccelerationKind::Materialized => {
            let database =
                require_field(&acceleration.database, "Database", "materialized view")?;
            let view =
                require_field(&acceleration.index_name, "Index name", "materialized view")?;
            Ok(format!(
                "{} MATERIALIZED VIEW {}.{}.{}",
                keyword, data_source_name, database, view
            ))
        }
        AccelerationKind::Other(kind) => Err(CatalogError::UnsupportedOperation(format!(
            "Unsupported acceleration type: {}",
            kind
        ))),
    }
}

fn require_field<'a>(value: &'a str, field: &str, target: &str) -> Result<&'a str, CatalogError> {
    if value.is_empty() {
        return Err(CatalogError::UnsupportedOperation(format!(
            "{} is required for {} operations",
            field, target
        )));
    }
    Ok(value)
}
