use chrono::Utc;
use env_logger::Env;
use log::error;
use std::io::Write;
use tablepod::command_line_interface::PARSED;
use tablepod::database_api::SqliteBackend;
use tablepod::warp_api;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().filter_or("RUST_LOG", "info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    let cli_options = &*PARSED;
    let backend = match SqliteBackend::open_file(&cli_options.database, cli_options.pool_size) {
        Ok(backend) => backend,
        Err(err) => {
            error!("Failed to open the database: {}", err);
            std::process::exit(1)
        }
    };
    warp_api::run_server(cli_options, backend).await;
}
