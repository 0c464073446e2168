//! Tandem CLI: develop interdependent npm packages side by side.

mod commands;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tandem_core::Workspace;

use commands::clean::CleanTarget;
use commands::App;

#[derive(Parser)]
#[command(name = "tandem", version, about = "Develop interdependent npm packages side by side")]
struct Cli {
    /// Path to tandem.toml or the directory holding it (default: search upward)
    #[arg(long, global = true, env = "TANDEM_CONFIG")]
    config: Option<PathBuf>,
    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync the module at PATH and its local dependencies
    Sync {
        /// Module directory (default: current directory)
        path: Option<PathBuf>,
        /// Do not run build commands
        #[arg(long)]
        no_build: bool,
    },
    /// Sync every configured module
    SyncAll {
        /// Do not run build commands
        #[arg(long)]
        no_build: bool,
    },
    /// Clone missing modules and install their dependencies
    Fetch {
        /// Only clone, do not run npm
        #[arg(long)]
        no_install: bool,
    },
    /// List configured modules
    ListModules,
    /// Show the local dependency tree
    DependencyTree,
    /// Remove cached tarballs, saved state, or both
    Clean {
        #[arg(value_enum)]
        target: CleanTarget,
    },
    /// Run npm in the current module against the registry proxy
    Npm {
        /// Arguments passed to npm
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Run the registry proxy in the foreground
    Serve {
        /// Port to listen on (0 picks a free port)
        #[arg(long, default_value_t = 0)]
        port: u16,
    },
    /// Create or refresh lockfiles of modules that use them
    Lockfile,
    /// Publish the module at PATH if it changed
    Publish {
        /// Module directory (default: current directory)
        path: Option<PathBuf>,
        /// Set this version before publishing
        #[arg(long)]
        new_version: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(cli).await;
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let workspace = Workspace::load(cli.config.as_deref(), &cwd)?;
    let app = App::new(Arc::new(workspace))?;

    match cli.command {
        Commands::Sync { path, no_build } => {
            let path = path.map(|p| cwd.join(p)).unwrap_or_else(|| cwd.clone());
            commands::sync::run(&app, &path, !no_build).await
        }
        Commands::SyncAll { no_build } => commands::sync::run_all(&app, !no_build).await,
        Commands::Fetch { no_install } => commands::fetch::run(&app, !no_install).await,
        Commands::ListModules => {
            print!("{}", commands::list::render(app.workspace()));
            Ok(())
        }
        Commands::DependencyTree => {
            print!("{}", commands::tree::render(app.workspace())?);
            Ok(())
        }
        Commands::Clean { target } => commands::clean::run(&app, target),
        Commands::Npm { args } => commands::npm::run(&app, &cwd, args).await,
        Commands::Serve { port } => commands::serve::run(&app, port).await,
        Commands::Lockfile => commands::lockfile::run(&app).await,
        Commands::Publish { path, new_version } => {
            let path = path.map(|p| cwd.join(p)).unwrap_or_else(|| cwd.clone());
            commands::publish::run(&app, &path, new_version).await
        }
    }
}

/// Log to stderr, filtered by `RUST_LOG` unless `--verbose` is given.
fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("tandem=debug,tandem_core=debug,tandem_registry=debug,tandem_sync=debug,tower_http=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("tandem=info,tandem_core=info,tandem_registry=info,tandem_sync=info,warn")
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[cfg(all(test, unix))]
mod integration_tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tandem_core::Dirs;
    use tandem_sync::SyncContext;

    /// A workspace with `app -> ui -> core` checked out under `modules/`.
    fn workspace(root: &Path) -> Workspace {
        std::fs::write(
            root.join("tandem.toml"),
            r#"
[workspace]
modules-dir = "modules"

[[module]]
name = "app"

[[module]]
name = "@acme/ui"

[[module]]
name = "@acme/core"
ignore-file = "modules/@acme/core/.gitignore"
"#,
        )
        .unwrap();
        for (dir, manifest) in [
            ("app", r#"{"name":"app","version":"1.0.0","dependencies":{"@acme/ui":"*"}}"#),
            ("@acme/ui", r#"{"name":"@acme/ui","version":"1.0.0","dependencies":{"@acme/core":"*"}}"#),
            ("@acme/core", r#"{"name":"@acme/core","version":"1.0.0"}"#),
        ] {
            let path = root.join("modules").join(dir);
            std::fs::create_dir_all(path.join("node_modules/.placeholder")).unwrap();
            std::fs::create_dir_all(path.join("node_modules/left-pad")).unwrap();
            std::fs::write(path.join("package.json"), manifest).unwrap();
            std::fs::write(path.join("index.js"), "module.exports = {};").unwrap();
        }
        let core = root.join("modules/@acme/core");
        std::fs::write(core.join(".gitignore"), "*.log\n").unwrap();
        std::fs::write(core.join("debug.log"), "").unwrap();

        Workspace::load(Some(root), root)
            .unwrap()
            .with_dirs(Dirs::under(&root.join(".tandem")))
    }

    /// npm that only records its arguments and registry.
    fn app(root: &Path, workspace: Workspace) -> App {
        let npm = root.join("fake-npm");
        std::fs::write(
            &npm,
            format!(
                "#!/bin/sh\necho \"$* $npm_config_registry\" >> '{}'\n",
                root.join("npm.log").display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&npm, std::fs::Permissions::from_mode(0o755)).unwrap();
        let ctx = SyncContext::new(Arc::new(workspace)).with_npm_program(npm.display().to_string());
        App::with_context(ctx).unwrap()
    }

    #[test]
    fn list_and_tree() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());

        let listing = commands::list::render(&ws);
        assert!(listing.contains("@acme/core: "));
        assert_eq!(listing.lines().count(), 3);

        let tree = commands::tree::render(&ws).unwrap();
        assert!(tree.starts_with("app\n└── @acme/ui\n    └── @acme/core\n"));
        assert!(tree.contains("1. @acme/core\n2. @acme/ui\n3. app\n"));
    }

    #[tokio::test]
    async fn sync_copies_dependencies_down_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let app = app(dir.path(), ws);
        let modules = dir.path().join("modules");

        commands::sync::run(&app, &modules.join("app"), true).await.unwrap();

        let ui_in_app = modules.join("app/node_modules/@acme/ui");
        let core_in_ui = modules.join("@acme/ui/node_modules/@acme/core");
        assert!(ui_in_app.join("index.js").is_file());
        assert!(core_in_ui.join("index.js").is_file());
        assert!(!core_in_ui.join("debug.log").exists());
        // sync only touches the chain below the root
        assert!(!modules.join("app/node_modules/@acme/core").exists());
        // nothing needed npm
        assert!(!dir.path().join("npm.log").exists());
    }

    #[tokio::test]
    async fn sync_outside_any_module_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let app = app(dir.path(), ws);
        let err = commands::sync::run(&app, dir.path(), true).await.unwrap_err();
        assert!(err.to_string().contains("no local module"));
    }

    #[tokio::test]
    async fn npm_passthrough_uses_proxy() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let app = app(dir.path(), ws);
        let module_dir = dir.path().join("modules/app");

        commands::npm::run(&app, &module_dir, vec!["ls".to_string(), "--depth=0".to_string()])
            .await
            .unwrap();
        let log = std::fs::read_to_string(dir.path().join("npm.log")).unwrap();
        assert!(log.starts_with("ls --depth=0 http://127.0.0.1:"));
        assert_eq!(log.lines().count(), 1);
    }

    #[tokio::test]
    async fn lockfile_is_created_with_registry_urls() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(
            root.join("tandem.toml"),
            "[workspace]\n\n[[module]]\nname = \"app\"\nlockfile = true\n",
        )
        .unwrap();
        let module_dir = root.join("modules/app");
        std::fs::create_dir_all(&module_dir).unwrap();
        std::fs::write(module_dir.join("package.json"), r#"{"name":"app","version":"1.0.0"}"#).unwrap();

        // npm writes proxy URLs, the way it does against the proxy
        let npm = root.join("fake-npm");
        std::fs::write(
            &npm,
            concat!(
                "#!/bin/sh\n",
                "[ \"$2\" = --package-lock-only ] || exit 1\n",
                "cat > package-lock.json <<JSON\n",
                "{\"name\": \"app\", \"lockfileVersion\": 1, \"dependencies\": {\"left-pad\": {\"version\": \"1.3.0\", ",
                "\"resolved\": \"${npm_config_registry}tarballs/left-pad?source=upstream&url=",
                "https%3A%2F%2Fregistry.npmjs.org%2Fleft-pad%2F-%2Fleft-pad-1.3.0.tgz\"}}}\n",
                "JSON\n",
            ),
        )
        .unwrap();
        std::fs::set_permissions(&npm, std::fs::Permissions::from_mode(0o755)).unwrap();

        let ws = Workspace::load(Some(root), root)
            .unwrap()
            .with_dirs(Dirs::under(&root.join(".tandem")));
        let ctx = SyncContext::new(Arc::new(ws)).with_npm_program(npm.display().to_string());
        let app = App::with_context(ctx).unwrap();

        commands::lockfile::run(&app).await.unwrap();
        let lock = std::fs::read_to_string(module_dir.join("package-lock.json")).unwrap();
        assert!(lock.contains("\"resolved\": \"https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz\""));
        assert!(!lock.contains("127.0.0.1"));

        // a second run leaves the existing lockfile to npm
        commands::lockfile::run(&app).await.unwrap();
    }

    #[test]
    fn clean_state_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let dirs = ws.dirs().clone();
        let app = app(dir.path(), ws);
        for d in [&dirs.state, &dirs.cache, &dirs.temp] {
            std::fs::create_dir_all(d).unwrap();
        }

        commands::clean::run(&app, CleanTarget::State).unwrap();
        assert!(!dirs.state.exists());
        assert!(dirs.cache.exists());

        commands::clean::run(&app, CleanTarget::All).unwrap();
        assert!(!dirs.cache.exists());
        assert!(!dirs.temp.exists());
    }

    #[test]
    fn cli_parses_npm_arguments() {
        let cli = Cli::try_parse_from(["tandem", "npm", "install", "--save", "left-pad"]).unwrap();
        match cli.command {
            Commands::Npm { args } => assert_eq!(args, vec!["install", "--save", "left-pad"]),
            _ => panic!("expected npm command"),
        }
        let cli = Cli::try_parse_from(["tandem", "--verbose", "sync", "--no-build"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Sync { path: None, no_build: true }));
    }
}
