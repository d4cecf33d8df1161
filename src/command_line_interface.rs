use lazy_static::lazy_static;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use structopt::clap::AppSettings;
use structopt::StructOpt;

#[derive(StructOpt, Debug, Clone)]
#[structopt(
    name = "Tablepod, an HTTP service for tables defined at runtime.",
    setting = AppSettings::DeriveDisplayOrder,
    setting = AppSettings::UnifiedHelpMessage,
    version = VERSION.as_ref(),
)]
pub struct CliOptions {
    /// Port to listen to.
    #[structopt(short, long, default_value = "3030", env = "TABLEPOD_PORT")]
    pub port: u16,

    /// Network interface to listen on.
    /// Defaults to the loopback interface, so that only programs
    /// from within the same computer can reach the server.
    #[structopt(
        short,
        long,
        name = "NETWORK_INTERFACE",
        default_value = "127.0.0.1",
        env = "TABLEPOD_ADDRESS"
    )]
    pub address: IpAddr,

    /// SQLite database file holding all tables.
    /// Missing parent directories are created on startup.
    #[structopt(
        short,
        long,
        parse(from_os_str),
        default_value = "./data/db/tables.sqlite",
        env = "TABLEPOD_DATABASE"
    )]
    pub database: PathBuf,

    /// Maximum number of simultaneously open database connections.
    #[structopt(long, default_value = "8", env = "TABLEPOD_POOL_SIZE")]
    pub pool_size: u32,

    /// Serve https using this public certificate file.
    /// Plain http is used unless both the certificate and the key are given.
    #[structopt(short = "c", long, name = "CERTIFICATE_FILE", requires = "KEY_FILE")]
    pub tls_pub_crt: Option<PathBuf>,

    /// File to read https private key from.
    #[structopt(short = "k", long, name = "KEY_FILE", requires = "CERTIFICATE_FILE")]
    pub tls_priv_key: Option<PathBuf>,
}

impl CliOptions {
    pub fn socket_address(&self) -> (IpAddr, u16) {
        (self.address, self.port)
    }
}

impl Default for CliOptions {
    fn default() -> Self {
        CliOptions {
            port: 3030,
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            database: PathBuf::from(crate::constants::DATABASE_DIR)
                .join(crate::constants::DATABASE_FILE),
            pool_size: 8,
            tls_pub_crt: None,
            tls_priv_key: None,
        }
    }
}

lazy_static! {
    pub static ref VERSION: String = crate::warp_endpoints::get_project_version();
}

lazy_static! {
    pub static ref PARSED: CliOptions = CliOptions::from_args();
}

#[cfg(test)]
pub mod tests {
    use super::CliOptions;
    use structopt::StructOpt;

    /// Example test CLI. Purely for convenience,
    /// you can instantiate your own / unrelated ones as well.
    pub fn test_cli() -> CliOptions {
        CliOptions {
            port: 0,
            pool_size: 1,
            ..CliOptions::default()
        }
    }

    #[test]
    fn test_default_arguments() {
        let parsed = CliOptions::from_iter_safe(&["tablepod"]).unwrap();
        let defaults = CliOptions::default();
        assert_eq!(parsed.database, defaults.database);
        assert_eq!(parsed.socket_address(), defaults.socket_address());
        assert_eq!(parsed.pool_size, defaults.pool_size);
        assert!(parsed.tls_pub_crt.is_none());
    }

    #[test]
    fn test_certificate_requires_key() {
        let result = CliOptions::from_iter_safe(&["tablepod", "-c", "cert.pem"]);
        assert!(result.is_err());
        let parsed =
            CliOptions::from_iter_safe(&["tablepod", "-c", "cert.pem", "-k", "key.pem", "-p", "80"])
                .unwrap();
        assert_eq!(parsed.port, 80);
        assert!(parsed.tls_priv_key.is_some());
        assert!(test_cli().tls_pub_crt.is_none());
    }
}
