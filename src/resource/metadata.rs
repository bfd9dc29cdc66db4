//! OpenAPI-style documentation for resource routes

use crate::resource::routes::RouteDefinition;
use axum::http::Method;
use serde_json::{Map, Value, json};

/// Names and limits the generated documentation refers to
#[derive(Debug, Clone)]
pub struct MetadataContext<'a> {
    pub schema_name: &'a str,
    pub collection_name: &'a str,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

fn verb_label(method: &Method) -> &'static str {
    match *method {
        Method::PUT => "Replace",
        Method::GET => "Retrieve",
        Method::PATCH => "Update",
        Method::DELETE => "Delete",
        Method::POST => "Insert",
        _ => "",
    }
}

/// Fill `meta` on every route with summary, parameters, request body and
/// responses per verb
///
/// Only the standard route paths (`/`, `/:_id`, `/query`, `/schema`) get a
/// summary; custom routes receive an empty entry per verb.
pub fn generate_api_metadata(routes: &mut [RouteDefinition], ctx: &MetadataContext<'_>) {
    let data = |is_list: bool| {
        let reference = json!({ "$ref": format!("#/components/schemas/{}", ctx.schema_name) });
        let schema = if is_list {
            json!({ "type": "array", "items": reference })
        } else {
            reference
        };
        json!({
            "description": format!("The {} data", ctx.schema_name),
            "content": { "application/json": { "schema": schema } }
        })
    };
    let query_params = json!([
        {
            "name": "limit",
            "in": "query",
            "description": format!(
                "How many results should be returned Default value is {} (max value is {})",
                ctx.default_page_size, ctx.max_page_size
            )
        },
        {
            "name": "page",
            "in": "query",
            "description": "The page of results to return (determined from the limit value)"
        }
    ]);

    for route in routes.iter_mut() {
        let mut meta = indexmap::IndexMap::new();
        for method in route.handlers.keys() {
            let mut entry = Map::new();
            match route.route.as_str() {
                "/" if *method == Method::POST => {
                    entry.insert(
                        "summary".into(),
                        format!("{} a new {} document", verb_label(method), ctx.schema_name).into(),
                    );
                    entry.insert("requestBody".into(), data(false));
                    entry.insert("responses".into(), json!({ "201": data(false) }));
                }
                "/" => {
                    entry.insert(
                        "summary".into(),
                        format!("Retrieve all {} documents", ctx.collection_name).into(),
                    );
                    entry.insert("parameters".into(), query_params.clone());
                    entry.insert("responses".into(), json!({ "200": data(true) }));
                }
                "/:_id" => {
                    entry.insert(
                        "summary".into(),
                        format!("{} an existing {} document", verb_label(method), ctx.schema_name).into(),
                    );
                    match *method {
                        Method::PUT | Method::PATCH => {
                            entry.insert("requestBody".into(), data(false));
                        }
                        Method::DELETE => {}
                        _ => {
                            entry.insert("requestBody".into(), json!({}));
                        }
                    }
                    let status = if *method == Method::DELETE { "204" } else { "200" };
                    entry.insert("responses".into(), json!({ status: data(false) }));
                }
                "/query" => {
                    entry.insert(
                        "summary".into(),
                        format!("Query all {}", ctx.collection_name).into(),
                    );
                    entry.insert("parameters".into(), query_params.clone());
                    entry.insert("responses".into(), json!({ "200": data(true) }));
                }
                "/schema" => {
                    entry.insert(
                        "summary".into(),
                        format!("Retrieve {} schema", ctx.schema_name).into(),
                    );
                }
                _ => {}
            }
            meta.insert(method.clone(), Value::Object(entry));
        }
        route.meta = meta;
    }
}
