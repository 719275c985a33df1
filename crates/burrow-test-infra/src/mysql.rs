use crate::Result;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::ImageExt;
use testcontainers::{ContainerAsync, GenericImage};
use typed_builder::TypedBuilder;

const MYSQL_PORT: u16 = 3306;

/// Settings for the disposable MySQL server.
///
/// The server collation defaults to `utf8mb4_bin`, so anything created
/// without an explicit collation still compares byte for byte.
#[derive(Debug, Clone, TypedBuilder)]
pub struct MysqlConfig {
    #[builder(default = "8.4".to_string(), setter(into))]
    image_tag: String,
    #[builder(default = "burrow".to_string(), setter(into))]
    database: String,
    #[builder(default = "burrow".to_string(), setter(into))]
    username: String,
    #[builder(default = "burrow".to_string(), setter(into))]
    password: String,
    #[builder(default = "utf8mb4_bin".to_string(), setter(into))]
    collation: String,
}

impl MysqlConfig {
    fn server_args(&self) -> Vec<String> {
        vec![
            "--character-set-server=utf8mb4".to_string(),
            format!("--collation-server={}", self.collation),
        ]
    }

    fn dsn(&self, host: &str, port: u16) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.username, self.password, host, port, self.database
        )
    }
}

/// Test fixture for a disposable MySQL server.
pub struct MySqlServer {
    container: ContainerAsync<GenericImage>,
    config: MysqlConfig,
}

impl MySqlServer {
    pub async fn new(config: MysqlConfig) -> Result<Self> {
        let container = GenericImage::new("mysql", config.image_tag.as_str())
            .with_exposed_port(MYSQL_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stderr("ready for connections"))
            .with_env_var("MYSQL_DATABASE", config.database.as_str())
            .with_env_var("MYSQL_USER", config.username.as_str())
            .with_env_var("MYSQL_PASSWORD", config.password.as_str())
            .with_env_var("MYSQL_ROOT_PASSWORD", "root")
            .with_cmd(config.server_args())
            .start()
            .await?;

        Ok(Self { container, config })
    }

    /// Connection string for the test database, as `MySqlRepository::connect` takes it.
    pub async fn database_url(&self) -> Result<String> {
        let host = self.container.get_host().await?.to_string();
        let port = self.container.get_host_port_ipv4(MYSQL_PORT).await?;
        Ok(self.config.dsn(&host, port))
    }
}
