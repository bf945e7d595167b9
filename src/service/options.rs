//! Discovery document served for OPTIONS: settings, per-table types and routes.

use crate::config::ApiSettings;
use crate::schema::{SchemaCatalog, TableSchema};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

const TYPE_GROUPS: &[(&str, &[&str])] = &[
    (
        "numeric",
        &[
            "tinyint", "smallint", "mediumint", "int", "integer", "bigint", "decimal", "numeric", "float", "double",
            "double precision", "real", "bit", "boolean", "serial", "bigserial", "money",
        ],
    ),
    (
        "date",
        &[
            "date", "datetime", "datetime2", "timestamp", "timestamp without time zone",
            "timestamp with time zone", "time", "time without time zone", "year",
        ],
    ),
    (
        "string",
        &[
            "char", "character", "varchar", "character varying", "nvarchar", "tinytext", "text", "mediumtext",
            "longtext", "binary", "varbinary", "tinyblob", "mediumblob", "blob", "longblob", "enum", "set", "uuid",
        ],
    ),
    (
        "spatial",
        &[
            "geometry", "point", "linestring", "polygon", "multipoint", "multilinestring", "multipolygon",
            "geometrycollection",
        ],
    ),
    ("json", &["json", "jsonb"]),
];

/// Group name for a column type; unknown types are reported as-is.
pub fn type_group(data_type: &str) -> String {
    let lower = data_type.to_lowercase();
    TYPE_GROUPS
        .iter()
        .find(|(_, members)| members.contains(&lower.as_str()))
        .map_or(lower.clone(), |(group, _)| group.to_string())
}

#[derive(Serialize)]
struct PropertyDoc {
    required: bool,
    #[serde(rename = "type")]
    kind: String,
    format: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    extra: String,
    #[serde(rename = "maxLength", skip_serializing_if = "Option::is_none")]
    max_length: Option<i64>,
}

#[derive(Serialize)]
struct TypeDoc {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "displayName")]
    display_name: String,
    description: String,
    properties: BTreeMap<String, PropertyDoc>,
}

fn type_doc(table: &TableSchema) -> TypeDoc {
    TypeDoc {
        kind: "object",
        display_name: table.name.clone(),
        description: table.comment.clone(),
        properties: table
            .columns
            .iter()
            .map(|c| {
                (
                    c.name.clone(),
                    PropertyDoc {
                        required: !c.nullable,
                        kind: type_group(&c.data_type),
                        format: c.data_type.clone(),
                        extra: c.extra.clone(),
                        max_length: c.max_length,
                    },
                )
            })
            .collect(),
    }
}

fn query_parameters(name: &str) -> Value {
    json!({
        "filter": { "type": "(field,opcode,value)", "example": format!("{name}?filter=col1,eq,aaa") },
        "columns": { "type": "string", "example": format!("{name}?columns=col1,col2,col3") },
        "distinct": { "type": "boolean", "default": false, "example": format!("{name}?distinct=true") },
        "exclude": { "type": "string", "example": format!("{name}?exclude=col1,col2") },
        "include": { "type": "string", "example": format!("{name}?include=other") },
        "order": { "type": "(field,asc|desc)", "example": format!("{name}?order=id,desc") },
        "page": { "type": "number | [number,number]", "example": [format!("{name}?page=0"), format!("{name}?page=0,10")] },
        "start": { "type": "number", "example": format!("{name}?start=10") },
        "length": { "type": "number", "example": format!("{name}?length=10") },
        "join": { "type": "(joinType,table,field,opcode,field)", "example": format!("{name}?join=left,other,other.id,eq,{name}.other_id") },
        "group": { "type": "string", "example": format!("{name}?group=id") },
        "having": { "type": "(field,opcode,value)", "example": format!("{name}?having=id,eq,1") },
        "relation": { "type": "(parent.column,child.column)", "example": format!("{name}?relation={name}.id,other.{name}_id") },
    })
}

fn route_doc(table: &TableSchema, settings: &ApiSettings) -> Value {
    let name = &table.name;
    let params = query_parameters(name);
    let mut collection = Map::new();
    collection.insert(
        "get".into(),
        json!({
            "description": format!("Return the {name} entities."),
            "queryParameters": params,
            "responses": { "200": { "body": { "application/json": { "type": format!("{name}[]") } } } },
        }),
    );
    if settings.allows("POST") {
        collection.insert(
            "post".into(),
            json!({
                "description": format!("Insert the {name} entities."),
                "body": { "type": format!("{name} | {name}[]") },
                "responses": { "201": { "body": { "type": "number | number[]", "description": "inserted id(s)" } } },
            }),
        );
    }
    if settings.allows("PUT") {
        collection.insert(
            "put".into(),
            json!({
                "description": format!("Save the {name} entities."),
                "body": { "type": format!("{name} | {name}[]") },
                "responses": { "200": { "body": { "type": "number | number[]", "description": "affected rows or inserted id" } } },
            }),
        );
    }
    if let Some(pk) = &table.primary_key {
        let mut item = Map::new();
        item.insert(
            "get".into(),
            json!({
                "description": format!("Get the {name} entity with {pk}."),
                "queryParameters": params,
                "responses": { "200": { "body": { "application/json": { "type": name } } } },
            }),
        );
        if settings.allows("PATCH") {
            item.insert(
                "patch".into(),
                json!({
                    "description": format!("Update the {name} entity with {pk}."),
                    "body": { "type": name },
                    "responses": { "200": { "body": { "type": "number | number[]", "description": "number of affected rows" } } },
                }),
            );
        }
        if settings.allows("DELETE") {
            item.insert(
                "delete".into(),
                json!({
                    "description": format!("Delete the {name} entity with {pk}."),
                    "responses": { "200": { "body": { "type": "number", "description": "number of affected rows" } } },
                }),
            );
        }
        collection.insert(format!("/{{{pk}}}"), Value::Object(item));
    }
    Value::Object(collection)
}

/// `{title, settings, types, routes}` for the main database.
pub fn describe(settings: &ApiSettings, catalog: &SchemaCatalog) -> Value {
    let mut types = Map::new();
    let mut routes = Map::new();
    for table in catalog.tables(&settings.main_db) {
        types.insert(table.name.clone(), json!(type_doc(table)));
        routes.insert(format!("/{}", table.name), route_doc(table, settings));
    }
    json!({
        "title": format!("RestAPI for '{}'", settings.main_db),
        "settings": settings,
        "types": types,
        "routes": routes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSchema, Dialect};

    #[test]
    fn groups_types() {
        assert_eq!(type_group("INT"), "numeric");
        assert_eq!(type_group("character varying"), "string");
        assert_eq!(type_group("jsonb"), "json");
        assert_eq!(type_group("tsvector"), "tsvector");
    }

    #[test]
    fn describes_tables_and_routes() {
        let mut catalog = SchemaCatalog::new();
        let mut id = ColumnSchema::new("id", "integer");
        id.nullable = false;
        catalog.insert_table("public", TableSchema::new("users", Some("id"), vec![id, ColumnSchema::new("name", "text")]));
        let settings = ApiSettings::new(Dialect::Postgres, "public").with_methods(["GET", "PATCH"]);
        let doc = describe(&settings, &catalog);
        assert_eq!(doc["title"], "RestAPI for 'public'");
        assert_eq!(doc["types"]["users"]["properties"]["id"]["required"], true);
        assert_eq!(doc["types"]["users"]["properties"]["name"]["type"], "string");
        let users = &doc["routes"]["/users"];
        assert!(users.get("get").is_some());
        assert!(users.get("post").is_none());
        assert!(users["/{id}"].get("patch").is_some());
        assert!(doc["settings"].get("database_url").is_none());
    }
}
