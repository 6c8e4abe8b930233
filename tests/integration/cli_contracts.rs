use kiln::persistence::{FsPersistence, Persistence};
use kiln::tooling::cli::{CacheCommands, CliContext, Commands};
use kiln::Cache;

use crate::support::Site;

fn workspace() -> Site {
    let site = Site::new();
    site.write("kiln.toml", "[cache]\ndir = \"build-cache\"\n")
        .write("pages/index.tsx", "import '../components/nav.tsx';\nimport './index.css';")
        .write("pages/about.tsx", "import '../components/nav.tsx';")
        .write("pages/_layout.tsx", "export default 1;")
        .write("pages/index.css", "main {}")
        .write("components/nav.tsx", "export default 1;");
    site
}

fn graph(format: &str) -> Commands {
    Commands::Graph {
        entrypoints: vec![],
        format: format.to_string(),
    }
}

#[tokio::test]
async fn graph_json_lists_discovered_modules() {
    let site = workspace();
    let cli = CliContext::new(site.root().to_path_buf(), None).unwrap();
    let output = cli.execute(&graph("json")).await.unwrap();

    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    let modules = parsed.as_object().unwrap();
    assert!(modules.contains_key("pages/index.tsx"));
    assert!(modules.contains_key("pages/about.tsx"));
    assert!(modules.contains_key("components/nav.tsx"));
    assert!(modules.contains_key("pages/index.css"));
    assert!(!modules.contains_key("pages/_layout.tsx"));
    assert!(parsed["pages/index.tsx"]["moduleHash"].is_string());
}

#[tokio::test]
async fn graph_text_renders_a_table() {
    let site = workspace();
    let cli = CliContext::new(site.root().to_path_buf(), None).unwrap();
    let output = cli.execute(&graph("text")).await.unwrap();
    assert!(output.contains("Module Hash"));
    assert!(output.contains("components/nav.tsx"));
    assert!(output.contains("Graph hash:"));
}

#[tokio::test]
async fn explicit_entrypoints_override_discovery() {
    let site = workspace();
    let cli = CliContext::new(site.root().to_path_buf(), None).unwrap();
    let output = cli
        .execute(&Commands::Graph {
            entrypoints: vec!["pages/about.tsx".into()],
            format: "json".to_string(),
        })
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(parsed.as_object().unwrap().len(), 2);
}

#[tokio::test]
async fn modules_command_writes_module_list() {
    let site = workspace();
    let cli = CliContext::new(site.root().to_path_buf(), None).unwrap();
    let output = cli
        .execute(&Commands::Modules {
            entrypoints: vec![],
            output: "out/modules.json".to_string(),
            detailed: true,
        })
        .await
        .unwrap();
    assert!(output.contains("out/modules.json"));

    let parsed: serde_json::Value =
        serde_json::from_str(&site.read("out/modules.json")).unwrap();
    assert_eq!(
        parsed["pages/index.tsx"]["dependencies"],
        serde_json::json!(["components/nav.tsx", "pages/index.css"])
    );
}

#[tokio::test]
async fn assets_json_contract() {
    let site = workspace();
    let cli = CliContext::new(site.root().to_path_buf(), None).unwrap();
    let output = cli
        .execute(&Commands::Assets {
            loaders: vec!["style=css".to_string()],
            format: "json".to_string(),
        })
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    let assets = parsed.as_array().unwrap();
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0]["loader"], "style");
    assert!(assets[0]["url"].as_str().unwrap().ends_with("pages/index.css"));
    assert!(assets[0]["moduleHash"].is_string());
}

#[tokio::test]
async fn cache_inspect_and_clear() {
    let site = workspace();
    let store = FsPersistence::new(site.root().join("build-cache"));
    let cache = Cache::<String>::new("identity");
    cache.set("abc", "dist/index.html".to_string());
    store
        .set("pages.json", &cache.serialize().unwrap())
        .await
        .unwrap();

    let cli = CliContext::new(site.root().to_path_buf(), None).unwrap();
    let output = cli
        .execute(&Commands::Cache {
            command: CacheCommands::Inspect {
                path: "pages.json".to_string(),
                format: "json".to_string(),
            },
        })
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(parsed["hash"], "identity");
    assert_eq!(parsed["data"]["abc"], "dist/index.html");

    cli.execute(&Commands::Cache {
        command: CacheCommands::Clear {
            path: "pages.json".to_string(),
        },
    })
    .await
    .unwrap();
    assert!(store.get("pages.json").await.unwrap_err().is_not_found());

    let missing = cli
        .execute(&Commands::Cache {
            command: CacheCommands::Inspect {
                path: "pages.json".to_string(),
                format: "text".to_string(),
            },
        })
        .await;
    assert!(missing.is_err());
}
