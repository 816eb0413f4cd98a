//! `sigraph-mcp init [--data-dir <path>]`
//!
//! Prepares the graph store and registers the server with every MCP client
//! found on PATH, in project-scoped config files under the current directory.

use std::error::Error;
use std::path::{Path, PathBuf};

use sigraph_core::HOME_ENV;

const SERVER_KEY: &str = "sigraph";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOptions {
    /// Store graphs here instead of the default data directory. Passed to the
    /// server through `SIGRAPH_HOME`.
    pub data_dir: Option<PathBuf>,
}

pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<InitOptions, String> {
    let mut data_dir = None;
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--data-dir" => match args.next() {
                Some(dir) => data_dir = Some(PathBuf::from(dir)),
                None => return Err("--data-dir needs a path".to_string()),
            },
            other => return Err(format!("unknown argument '{other}'")),
        }
    }
    Ok(InitOptions { data_dir })
}

/// How a client launches the server.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LaunchSpec {
    command: String,
    data_dir: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Client {
    ClaudeCode,
    Codex,
}

impl Client {
    const ALL: [Client; 2] = [Client::ClaudeCode, Client::Codex];

    fn binary(self) -> &'static str {
        match self {
            Client::ClaudeCode => "claude",
            Client::Codex => "codex",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Client::ClaudeCode => "Claude Code",
            Client::Codex => "Codex",
        }
    }

    fn register(self, project: &Path, spec: &LaunchSpec) -> Result<PathBuf, Box<dyn Error>> {
        match self {
            Client::ClaudeCode => write_mcp_json(project, spec),
            Client::Codex => write_codex_toml(project, spec),
        }
    }
}

pub fn run(options: InitOptions) -> Result<(), Box<dyn Error>> {
    let clients: Vec<Client> = Client::ALL
        .into_iter()
        .filter(|c| on_path(c.binary()))
        .collect();
    if clients.is_empty() {
        eprintln!("Neither `claude` nor `codex` found in PATH.");
        eprintln!("Install Claude Code or OpenAI Codex first, then re-run `sigraph-mcp init`.");
        std::process::exit(1);
    }

    let data_dir = options.data_dir.clone().unwrap_or_else(sigraph_core::data_dir);
    if sigraph_core::init_data_dir_in(&data_dir)? {
        eprintln!("Seeded default settings in {}", data_dir.display());
    }
    let graphs = sigraph_core::list_graphs_in(&data_dir)?;
    eprintln!("{} stored graph(s) in {}", graphs.len(), data_dir.display());

    let spec = LaunchSpec {
        command: std::env::current_exe()?
            .canonicalize()?
            .to_string_lossy()
            .to_string(),
        data_dir: options
            .data_dir
            .map(|d| d.to_string_lossy().to_string()),
    };
    let project = std::env::current_dir()?;
    for client in &clients {
        let path = client.register(&project, &spec)?;
        eprintln!("Wrote {}", path.display());
    }

    let labels: Vec<&str> = clients.iter().map(|c| c.label()).collect();
    eprintln!("\nDone. {} will use sigraph in this project.", labels.join(" and "));
    Ok(())
}

fn on_path(name: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths)
        .any(|dir| dir.join(name).is_file() || dir.join(format!("{name}.exe")).is_file())
}

/// Merge the server entry into `.mcp.json`, keeping other servers.
fn write_mcp_json(project: &Path, spec: &LaunchSpec) -> Result<PathBuf, Box<dyn Error>> {
    let path = project.join(".mcp.json");
    let mut root: serde_json::Value = match std::fs::read_to_string(&path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|_| serde_json::json!({})),
        Err(_) => serde_json::json!({}),
    };
    if !root.get("mcpServers").is_some_and(|v| v.is_object()) {
        root["mcpServers"] = serde_json::json!({});
    }

    let mut entry = serde_json::json!({
        "type": "stdio",
        "command": spec.command,
        "args": [],
    });
    if let Some(dir) = &spec.data_dir {
        entry["env"] = serde_json::json!({ HOME_ENV: dir });
    }
    root["mcpServers"][SERVER_KEY] = entry;

    std::fs::write(&path, serde_json::to_string_pretty(&root)?)?;
    Ok(path)
}

/// Merge the server table into `.codex/config.toml`, keeping other servers.
fn write_codex_toml(project: &Path, spec: &LaunchSpec) -> Result<PathBuf, Box<dyn Error>> {
    let dir = project.join(".codex");
    let path = dir.join("config.toml");
    let mut doc: toml_edit::DocumentMut = std::fs::read_to_string(&path)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    if !doc.contains_table("mcp_servers") {
        doc["mcp_servers"] = toml_edit::Item::Table(toml_edit::Table::new());
    }

    let mut server = toml_edit::Table::new();
    server.insert("command", toml_edit::value(spec.command.as_str()));
    server.insert("args", toml_edit::value(toml_edit::Array::new()));
    if let Some(data_dir) = &spec.data_dir {
        let mut env = toml_edit::Table::new();
        env.insert(HOME_ENV, toml_edit::value(data_dir.as_str()));
        server.insert("env", toml_edit::Item::Table(env));
    }
    doc["mcp_servers"][SERVER_KEY] = toml_edit::Item::Table(server);

    std::fs::create_dir_all(&dir)?;
    std::fs::write(&path, doc.to_string())?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(data_dir: Option<&str>) -> LaunchSpec {
        LaunchSpec {
            command: "/bin/sigraph-mcp".into(),
            data_dir: data_dir.map(String::from),
        }
    }

    #[test]
    fn parses_data_dir() {
        let opts = parse_args(["--data-dir".to_string(), "/srv/g".to_string()]).unwrap();
        assert_eq!(opts.data_dir, Some(PathBuf::from("/srv/g")));
        assert_eq!(parse_args(Vec::new()).unwrap().data_dir, None);
        assert!(parse_args(["--data-dir".to_string()]).is_err());
        assert!(parse_args(["--force".to_string()]).is_err());
    }

    #[test]
    fn mcp_json_keeps_other_servers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".mcp.json"),
            r#"{"mcpServers": {"other": {"command": "x"}}}"#,
        )
        .unwrap();
        let path = write_mcp_json(dir.path(), &spec(None)).unwrap();
        let root: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(root["mcpServers"]["other"]["command"], "x");
        assert_eq!(root["mcpServers"]["sigraph"]["command"], "/bin/sigraph-mcp");
        assert!(root["mcpServers"]["sigraph"].get("env").is_none());
    }

    #[test]
    fn data_dir_is_passed_through_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_mcp_json(dir.path(), &spec(Some("/srv/g"))).unwrap();
        let root: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(root["mcpServers"]["sigraph"]["env"]["SIGRAPH_HOME"], "/srv/g");

        let path = write_codex_toml(dir.path(), &spec(Some("/srv/g"))).unwrap();
        let doc: toml_edit::DocumentMut = std::fs::read_to_string(path).unwrap().parse().unwrap();
        assert_eq!(
            doc["mcp_servers"]["sigraph"]["command"].as_str(),
            Some("/bin/sigraph-mcp")
        );
        assert_eq!(
            doc["mcp_servers"]["sigraph"]["env"]["SIGRAPH_HOME"].as_str(),
            Some("/srv/g")
        );
    }

    #[test]
    fn codex_config_keeps_other_servers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".codex")).unwrap();
        std::fs::write(
            dir.path().join(".codex/config.toml"),
            "[mcp_servers.other]\ncommand = \"x\"\n",
        )
        .unwrap();
        let path = write_codex_toml(dir.path(), &spec(None)).unwrap();
        let doc: toml_edit::DocumentMut = std::fs::read_to_string(path).unwrap().parse().unwrap();
        assert_eq!(doc["mcp_servers"]["other"]["command"].as_str(), Some("x"));
        assert!(doc["mcp_servers"]["sigraph"].get("env").is_none());
    }
}
