use crate::command_line_interface::CliOptions;
use crate::database_api::SqliteBackend;
use crate::error::Result;
use crate::warp_endpoints;
use bytes::Bytes;
use log::info;
use log::warn;
use serde::Serialize;
use std::sync::Arc;
use warp::http::header::HeaderMap;
use warp::http::header::HeaderValue;
use warp::http::StatusCode;
use warp::Filter;
use warp::Reply;

/// Maximum accepted size of a request body.
const BODY_LIMIT: u64 = 4 * 1024 * 1024;

fn respond<T: Serialize>(result: Result<T>, success: StatusCode) -> Box<dyn Reply> {
    match result {
        Ok(value) => Box::new(warp::reply::with_status(warp::reply::json(&value), success)),
        Err(err) => {
            let code = err.code();
            if code.is_server_error() {
                warn!("{}", err);
            } else {
                info!("Request failed: {}", err);
            }
            Box::new(warp::reply::with_status(err.msg, code))
        }
    }
}

/// Fallback for requests without a Content-Length, their body is not read.
/// Sized bodies are left to the limited body filter.
async fn empty_unless_sized(length: Option<u64>) -> std::result::Result<Bytes, warp::Rejection> {
    match length {
        None => Ok(Bytes::new()),
        Some(_) => Err(warp::reject::not_found()),
    }
}

/// All HTTP routes of the service.
pub fn routes(
    backend: Arc<SqliteBackend>,
) -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone {
    let version = warp::path("version")
        .and(warp::path::end())
        .and(warp::get())
        .map(warp_endpoints::get_project_version);

    let mut headers = HeaderMap::new();
    headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    let headers = warp::reply::with::headers(headers);

    let body = warp::body::content_length_limit(BODY_LIMIT).and(warp::body::bytes());

    let back = backend.clone();
    let create_table = warp::path("table")
        .and(warp::path::end())
        .and(warp::post())
        .and(body.clone())
        .map(move |body: Bytes| {
            let result = warp_endpoints::create_table(&back, body);
            respond(result, StatusCode::CREATED)
        });

    let back = backend.clone();
    let list_tables = warp::path("table")
        .and(warp::path::end())
        .and(warp::get())
        .map(move || {
            let result = warp_endpoints::list_tables(&back);
            respond(result, StatusCode::OK)
        });

    let back = backend.clone();
    let get_table = warp::path!("table" / String)
        .and(warp::get())
        .map(move |name: String| {
            let result = warp_endpoints::get_table(&back, name);
            respond(result, StatusCode::OK)
        });

    let back = backend.clone();
    let rename_table = warp::path!("table" / "rename" / String)
        .and(warp::patch())
        .and(body.clone())
        .map(move |name: String, body: Bytes| {
            let result = warp_endpoints::rename_table(&back, name, body);
            respond(result, StatusCode::CREATED)
        });

    let back = backend.clone();
    let alter_table = warp::path!("table" / String)
        .and(warp::put())
        .and(body.clone())
        .map(move |name: String, body: Bytes| {
            let result = warp_endpoints::alter_table(&back, name, body);
            respond(result, StatusCode::OK)
        });

    let back = backend.clone();
    let drop_table = warp::path!("table" / String)
        .and(warp::delete())
        .map(move |name: String| {
            let result = warp_endpoints::drop_table(&back, name);
            respond(result, StatusCode::OK)
        });

    let back = backend.clone();
    let insert_record = warp::path!("record" / String)
        .and(warp::post())
        .and(body.clone())
        .map(move |table: String, body: Bytes| {
            let result = warp_endpoints::insert_record(&back, table, body);
            respond(result, StatusCode::CREATED)
        });

    // The query body of a listing is optional and GET requests often come without
    // Content-Length. Bodies that declare a length are still held to the limit.
    let optional_body = body
        .clone()
        .or(warp::header::optional::<u64>("content-length").and_then(empty_unless_sized))
        .unify();

    let back = backend.clone();
    let list_records = warp::path!("record" / String)
        .and(warp::get())
        .and(optional_body)
        .map(move |table: String, body: Bytes| {
            let result = warp_endpoints::list_records(&back, table, body);
            respond(result, StatusCode::OK)
        });

    let back = backend.clone();
    let get_record = warp::path!("record" / String / i64)
        .and(warp::get())
        .map(move |table: String, id: i64| {
            let result = warp_endpoints::get_record(&back, table, id);
            respond(result, StatusCode::OK)
        });

    let back = backend.clone();
    let update_record = warp::path!("record" / String / i64)
        .and(warp::patch())
        .and(body)
        .map(move |table: String, id: i64, body: Bytes| {
            let result = warp_endpoints::update_record(&back, table, id, body);
            respond(result, StatusCode::OK)
        });

    let back = backend;
    let delete_record = warp::path!("record" / String / i64)
        .and(warp::delete())
        .map(move |table: String, id: i64| {
            let result = warp_endpoints::delete_record(&back, table, id);
            respond(result, StatusCode::OK)
        });

    version
        .with(&headers)
        .or(create_table.with(&headers))
        .or(list_tables.with(&headers))
        .or(rename_table.with(&headers))
        .or(get_table.with(&headers))
        .or(alter_table.with(&headers))
        .or(drop_table.with(&headers))
        .or(insert_record.with(&headers))
        .or(list_records.with(&headers))
        .or(get_record.with(&headers))
        .or(update_record.with(&headers))
        .or(delete_record.with(&headers))
}

/// Start web framework with specified APIs.
pub async fn run_server(cli_options: &CliOptions, backend: SqliteBackend) {
    let package_name = env!("CARGO_PKG_NAME").to_uppercase();
    info!("Starting {} HTTP server", package_name);
    let routes = routes(Arc::new(backend));
    let address = cli_options.socket_address();
    match (&cli_options.tls_pub_crt, &cli_options.tls_priv_key) {
        (Some(cert), Some(key)) => {
            info!("Listening on https://{}:{}", address.0, address.1);
            warp::serve(routes)
                .tls()
                .cert_path(cert)
                .key_path(key)
                .run(address)
                .await
        }
        _ => {
            info!("Listening on http://{}:{}", address.0, address.1);
            warp::serve(routes).run(address).await
        }
    }
}
