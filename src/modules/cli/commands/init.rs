//! Init command implementation

use clap::Args;
use std::fs;
use std::path::Path;
use tracing::info;
use unibase_core::UnibaseError;
use unibase_types::ConnectorKind;

/// Init command arguments
#[derive(Args, Debug)]
pub struct InitCommand {
    /// Deployment name
    #[arg(default_value = "my-data")]
    pub name: String,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub output: String,

    /// Backend of the sample connector (postgres, mysql, sqlite, mongodb, redis, file, http)
    #[arg(short = 'k', long, default_value = "postgres")]
    pub kind: String,

    /// Overwrite existing files
    #[arg(long)]
    pub force: bool,
}

impl InitCommand {
    /// Execute the init command
    pub async fn execute(&self) -> Result<(), UnibaseError> {
        info!("Initializing new Unibase configuration: {}", self.name);

        let output_dir = Path::new(&self.output);
        if !output_dir.exists() {
            fs::create_dir_all(output_dir)?;
        }

        let config_path = output_dir.join("unibase.yaml");
        let env_path = output_dir.join(".env.example");
        if !self.force {
            for path in [&config_path, &env_path] {
                if path.exists() {
                    return Err(UnibaseError::configuration(format!(
                        "{} already exists (use --force to overwrite)",
                        path.display()
                    )));
                }
            }
        }

        fs::write(&config_path, self.generate_config()?)?;
        info!("Created: {}", config_path.display());

        fs::write(&env_path, self.generate_env_example())?;
        info!("Created: {}", env_path.display());

        println!("\nUnibase configuration initialized!");
        println!("\nNext steps:");
        println!("  1. Copy .env.example to .env and fill in the credentials");
        println!("  2. Edit unibase.yaml to add your connectors");
        println!("  3. Run: unibase check -f unibase.yaml");

        Ok(())
    }

    /// Sample connector block for the chosen backend
    fn connector_block(&self) -> Result<String, UnibaseError> {
        let backend = self.kind.to_lowercase();
        let kind: ConnectorKind = backend.parse().map_err(UnibaseError::configuration)?;

        let block = match (kind, backend.as_str()) {
            (ConnectorKind::Sql, "sqlite") => r#"    kind: sql
    database: ./data.db
    options:
      driver: sqlite"#
                .to_string(),
            (ConnectorKind::Sql, driver) => {
                let (driver, port) = if driver == "mysql" {
                    ("mysql", 3306)
                } else {
                    ("postgres", 5432)
                };
                format!(
                    r#"    kind: sql
    host: "{{{{ env.DB_HOST | localhost }}}}"
    port: {}
    username: "{{{{ env.DB_USER | app }}}}"
    password: "{{{{ env.DB_PASSWORD | secret }}}}"
    database: app
    pool:
      max_open: 10
      max_idle: 2
    options:
      driver: {}"#,
                    port, driver
                )
            }
            (ConnectorKind::Document, _) => r#"    kind: document
    host: "{{ env.MONGO_HOST | localhost }}"
    port: 27017
    database: app"#
                .to_string(),
            (ConnectorKind::Cache, _) => r#"    kind: cache
    host: "{{ env.REDIS_HOST | localhost }}"
    port: 6379
    database: "0""#
                .to_string(),
            (ConnectorKind::File, _) => r#"    kind: file
    base_path: ./data"#
                .to_string(),
            (ConnectorKind::Api, _) => r#"    kind: api
    base_url: "{{ env.API_URL | https://api.example.com }}"
    timeout_secs: 10
    options:
      health_path: /health
      header.Authorization: "Bearer {{ env.API_TOKEN | changeme }}""#
                .to_string(),
        };
        Ok(block)
    }

    /// Generate configuration file content
    fn generate_config(&self) -> Result<String, UnibaseError> {
        Ok(format!(
            r#"# Unibase configuration
# env placeholders are filled from the process environment and .env; the
# value after `|` is used when the variable is unset

name: {}

connectors:
  main:
{}
"#,
            self.name,
            self.connector_block()?
        ))
    }

    /// Generate .env.example content
    fn generate_env_example(&self) -> String {
        let vars: &[&str] = match self.kind.to_lowercase().as_str() {
            "postgres" | "postgresql" | "mysql" => &["DB_HOST=localhost", "DB_USER=app", "DB_PASSWORD=secret"],
            "mongodb" | "mongo" | "document" => &["MONGO_HOST=localhost"],
            "redis" | "cache" => &["REDIS_HOST=localhost"],
            "http" | "api" | "websocket" => &["API_URL=https://api.example.com", "API_TOKEN=changeme"],
            _ => &[],
        };

        let mut out = String::from("# Connection settings referenced from unibase.yaml\n");
        for var in vars {
            out.push_str(var);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn command(kind: &str, output: &str) -> InitCommand {
        InitCommand {
            name: "test-data".to_string(),
            output: output.to_string(),
            kind: kind.to_string(),
            force: false,
        }
    }

    #[test]
    fn test_generate_config_postgres() {
        let config = command("postgres", ".").generate_config().unwrap();
        assert!(config.contains("name: test-data"));
        assert!(config.contains("driver: postgres"));
        assert!(config.contains("{{ env.DB_HOST | localhost }}"));
    }

    #[test]
    fn test_generated_configs_parse() {
        for kind in ["postgres", "mysql", "sqlite", "mongodb", "redis", "file", "http"] {
            let config = command(kind, ".").generate_config().unwrap();
            let model = unibase_parser::parse_string(&config)
                .unwrap_or_else(|e| panic!("{} sample does not parse: {}", kind, e));
            assert!(model.find_connector("main").is_some(), "{}", kind);
        }
    }

    #[test]
    fn test_unknown_kind() {
        let err = command("cassandra", ".").generate_config().unwrap_err();
        assert!(err.to_string().contains("unsupported connector type"));
    }

    #[tokio::test]
    async fn test_execute_writes_files_and_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("project");
        let cmd = command("redis", out.to_str().unwrap());

        cmd.execute().await.unwrap();
        let env = fs::read_to_string(out.join(".env.example")).unwrap();
        assert!(env.contains("REDIS_HOST=localhost"));
        assert!(out.join("unibase.yaml").exists());

        assert!(cmd.execute().await.is_err());

        let forced = InitCommand { force: true, ..cmd };
        forced.execute().await.unwrap();
    }
}
