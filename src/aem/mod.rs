//! Adobe Experience Manager adapter.

use reqwest::{
    header::{HeaderMap, HeaderValue, InvalidHeaderValue},
    Method,
};
use serde_json::{json, Value};

use crate::{
    auth::{
        client::{AuthenticatedClient, Error, Payload},
        client_credentials::ClientCredentials,
        token_manager::TokenManager,
        ExpiringToken, TokenProvider,
    },
    config::AemConfig,
    core::{render_json, Adapter, Arguments, InputError, ToolSpec},
    utils::{join_segments, ServerError},
};

const DAM_ROOT: &str = "content/dam";
const DEFAULT_SEARCH_LIMIT: u64 = 20;

pub struct Provider<AuthTokenProvider>
where
    AuthTokenProvider: TokenProvider,
{
    pub host: reqwest::Url,
    pub client: AuthenticatedClient<AuthTokenProvider>,
}

/// Build the AEM adapter authenticating with the configured client credentials.
pub fn connect(
    config: &AemConfig,
    http: reqwest::Client,
) -> Result<Provider<ClientCredentials>, InvalidHeaderValue> {
    let credentials = ClientCredentials::new(http.clone(), &config.credentials);
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-api-key",
        HeaderValue::from_str(&config.credentials.client_id)?,
    );
    let client = AuthenticatedClient::new(http, TokenManager::new(credentials)).with_headers(headers);
    Ok(Provider {
        host: config.host.clone(),
        client,
    })
}

/// Asset path relative to the DAM root, e.g. `/content/dam/site/logo.png` -> `site/logo.png`.
fn asset_path(raw: &str) -> Result<String, InputError> {
    let trimmed = raw.trim().trim_matches('/');
    let relative = trimmed.strip_prefix(DAM_ROOT).unwrap_or(trimmed);
    let relative = relative.trim_matches('/');
    check_segments(relative)?;
    Ok(relative.to_owned())
}

/// Repository path of a page, always rooted under `/content`.
fn content_path(raw: &str) -> Result<String, InputError> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(InputError::Missing("path"));
    }
    check_segments(trimmed)?;
    if trimmed == "content" || trimmed.starts_with("content/") {
        Ok(trimmed.to_owned())
    } else {
        Ok(format!("content/{trimmed}"))
    }
}

fn check_segments(path: &str) -> Result<(), InputError> {
    if path.split('/').any(|segment| segment == ".." || segment == ".") {
        return Err(InputError::Invalid {
            name: "path",
            reason: "must not contain relative segments",
        });
    }
    Ok(())
}

fn page_depth(args: &Arguments) -> Result<String, InputError> {
    let invalid = InputError::Invalid {
        name: "depth",
        reason: "must be a non-negative integer or \"infinity\"",
    };
    match args.opt_str("depth") {
        Ok(None) => Ok("1".into()),
        Ok(Some("infinity")) => Ok("infinity".into()),
        Ok(Some(depth)) => depth
            .parse::<u64>()
            .map(|depth| depth.to_string())
            .map_err(|_| invalid),
        Err(_) => args
            .opt_u64("depth")
            .map_err(|_| invalid)?
            .map(|depth| depth.to_string())
            .ok_or(InputError::Missing("depth")),
    }
}

impl<AuthTokenProvider> Provider<AuthTokenProvider>
where
    AuthTokenProvider: TokenProvider,
    <AuthTokenProvider as TokenProvider>::Token: ExpiringToken,
{
    fn build_assets_url(&self, path: &str, json: bool) -> reqwest::Url {
        let mut segments: Vec<String> = vec!["api".into(), "assets".into()];
        segments.extend(path.split('/').filter(|s| !s.is_empty()).map(str::to_owned));
        if json {
            if let Some(last) = segments.last_mut() {
                last.push_str(".json");
            }
        }
        join_segments(&self.host, segments.iter().map(String::as_str))
    }

    fn build_page_url(&self, path: &str, depth: &str) -> reqwest::Url {
        let mut segments: Vec<String> = path.split('/').map(str::to_owned).collect();
        if let Some(last) = segments.last_mut() {
            last.push_str(&format!(".{depth}.json"));
        }
        join_segments(&self.host, segments.iter().map(String::as_str))
    }

    fn build_query_url(&self, params: &[(&str, String)]) -> reqwest::Url {
        let mut url = join_segments(&self.host, ["bin", "querybuilder.json"]);
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        url
    }

    pub async fn list_assets(
        &self,
        path: &str,
    ) -> Result<model::Entity, Error<AuthTokenProvider::Error>> {
        let url = self.build_assets_url(path, true);
        self.client
            .send_json(Method::GET, url.as_str(), &Payload::Empty)
            .await
    }

    pub async fn update_asset_metadata(
        &self,
        path: &str,
        properties: &serde_json::Map<String, Value>,
    ) -> Result<(), Error<AuthTokenProvider::Error>> {
        let url = self.build_assets_url(path, false);
        let body = json!({ "class": "asset", "properties": properties });
        self.client
            .send(Method::PUT, url.as_str(), &Payload::Json(body))
            .await?;
        Ok(())
    }

    pub async fn create_folder(
        &self,
        path: &str,
        title: &str,
    ) -> Result<(), Error<AuthTokenProvider::Error>> {
        let url = self.build_assets_url(path, false);
        let body = json!({ "class": "assetFolder", "properties": { "title": title } });
        self.client
            .send(Method::POST, url.as_str(), &Payload::Json(body))
            .await?;
        Ok(())
    }

    pub async fn delete_asset(&self, path: &str) -> Result<(), Error<AuthTokenProvider::Error>> {
        let url = self.build_assets_url(path, false);
        self.client
            .send(Method::DELETE, url.as_str(), &Payload::Empty)
            .await?;
        Ok(())
    }

    pub async fn get_page(
        &self,
        path: &str,
        depth: &str,
    ) -> Result<Value, Error<AuthTokenProvider::Error>> {
        let url = self.build_page_url(path, depth);
        self.client
            .send_json(Method::GET, url.as_str(), &Payload::Empty)
            .await
    }

    pub async fn search(
        &self,
        params: &[(&str, String)],
    ) -> Result<model::QueryResult, Error<AuthTokenProvider::Error>> {
        let url = self.build_query_url(params);
        self.client
            .send_json(Method::GET, url.as_str(), &Payload::Empty)
            .await
    }

    pub async fn replicate(
        &self,
        command: &str,
        path: &str,
    ) -> Result<(), Error<AuthTokenProvider::Error>> {
        let url = join_segments(&self.host, ["bin", "replicate.json"]);
        let form = Payload::Form(vec![
            ("cmd".into(), command.into()),
            ("path".into(), path.into()),
        ]);
        self.client.send(Method::POST, url.as_str(), &form).await?;
        Ok(())
    }
}

fn render_listing(path: &str, entity: &model::Entity) -> String {
    let mut out = if path.is_empty() {
        format!("Contents of /{DAM_ROOT}:\n")
    } else {
        format!("Contents of /{DAM_ROOT}/{path}:\n")
    };
    if entity.entities.is_empty() {
        out.push_str("(empty)\n");
    }
    for child in &entity.entities {
        let kind = if child.is_folder() { "folder" } else { "asset" };
        let name = child.name().unwrap_or("<unnamed>");
        match child.title() {
            Some(title) if title != name => out.push_str(&format!("- [{kind}] {name} ({title})\n")),
            _ => out.push_str(&format!("- [{kind}] {name}\n")),
        }
    }
    out
}

fn render_hits(result: &model::QueryResult) -> String {
    let mut out = format!("Found {} result(s):\n", result.total);
    for hit in &result.hits {
        let path = hit.get("path").and_then(Value::as_str).unwrap_or("<unknown>");
        match hit.get("title").and_then(Value::as_str) {
            Some(title) => out.push_str(&format!("- {path} ({title})\n")),
            None => out.push_str(&format!("- {path}\n")),
        }
    }
    out
}

pub mod model {
    use serde::Deserialize;
    use serde_json::{Map, Value};

    /// A Siren entity as returned by the Assets HTTP API.
    #[derive(Default, Debug, Clone, PartialEq, Deserialize)]
    pub struct Entity {
        #[serde(default)]
        pub class: Vec<String>,
        #[serde(default)]
        pub properties: Map<String, Value>,
        #[serde(default)]
        pub entities: Vec<Entity>,
    }

    impl Entity {
        pub fn is_folder(&self) -> bool {
            self.class.iter().any(|class| class == CLASS_FOLDER)
        }

        pub fn name(&self) -> Option<&str> {
            self.properties.get("name").and_then(Value::as_str)
        }

        pub fn title(&self) -> Option<&str> {
            self.properties
                .get("title")
                .or_else(|| self.properties.get("dc:title"))
                .and_then(Value::as_str)
        }
    }

    #[derive(Default, Debug, Clone, PartialEq, Deserialize)]
    pub struct QueryResult {
        #[serde(default)]
        pub total: u64,
        #[serde(default)]
        pub hits: Vec<Map<String, Value>>,
    }

    pub const CLASS_FOLDER: &str = "assets/folder";
}

#[async_trait::async_trait]
impl<AuthTokenProvider> Adapter for Provider<AuthTokenProvider>
where
    AuthTokenProvider: TokenProvider,
    <AuthTokenProvider as TokenProvider>::Token: ExpiringToken,
    <AuthTokenProvider as TokenProvider>::Error: std::error::Error + 'static,
{
    fn name(&self) -> &'static str {
        "aem"
    }

    fn tools(&self) -> Vec<ToolSpec> {
        let path_only = json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"],
        });
        vec![
            ToolSpec {
                name: "aem_list_assets",
                description: "List the assets and folders below a DAM folder.",
                input_schema: json!({
                    "type": "object",
                    "properties": { "path": { "type": "string" } },
                }),
            },
            ToolSpec {
                name: "aem_get_asset_metadata",
                description: "Read the metadata properties of a DAM asset.",
                input_schema: path_only.clone(),
            },
            ToolSpec {
                name: "aem_update_asset_metadata",
                description: "Set metadata properties on a DAM asset.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "properties": { "type": "object" },
                    },
                    "required": ["path", "properties"],
                }),
            },
            ToolSpec {
                name: "aem_create_folder",
                description: "Create a DAM folder.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "title": { "type": "string" },
                    },
                    "required": ["path"],
                }),
            },
            ToolSpec {
                name: "aem_delete_asset",
                description: "Delete a DAM asset or folder.",
                input_schema: path_only,
            },
            ToolSpec {
                name: "aem_get_page",
                description: "Read the JSON rendering of a content page.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "depth": { "type": ["integer", "string"] },
                    },
                    "required": ["path"],
                }),
            },
            ToolSpec {
                name: "aem_search",
                description: "Search the repository with QueryBuilder.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "type": { "type": "string" },
                        "fulltext": { "type": "string" },
                        "limit": { "type": "integer" },
                    },
                }),
            },
            ToolSpec {
                name: "aem_publish",
                description: "Publish or unpublish a page or asset.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "action": { "type": "string", "enum": ["publish", "unpublish"] },
                    },
                    "required": ["path"],
                }),
            },
        ]
    }

    async fn call(&self, tool: &str, args: &Arguments) -> Result<String, anyhow::Error> {
        match tool {
            "aem_list_assets" => {
                let path = asset_path(args.opt_str("path")?.unwrap_or_default())?;
                let listing = self.list_assets(&path).await?;
                Ok(render_listing(&path, &listing))
            }
            "aem_get_asset_metadata" => {
                let path = required_asset_path(args)?;
                match self.list_assets(&path).await {
                    Ok(entity) => Ok(render_json(&Value::Object(entity.properties))),
                    Err(Error::Server(ServerError {
                        status_code: 404, ..
                    })) => Ok(format!("No asset found at /{DAM_ROOT}/{path}")),
                    Err(err) => Err(err.into()),
                }
            }
            "aem_update_asset_metadata" => {
                let path = required_asset_path(args)?;
                let properties = args.object("properties")?;
                self.update_asset_metadata(&path, properties).await?;
                Ok(format!(
                    "Updated {} metadata propert{} on /{DAM_ROOT}/{path}",
                    properties.len(),
                    if properties.len() == 1 { "y" } else { "ies" },
                ))
            }
            "aem_create_folder" => {
                let path = required_asset_path(args)?;
                let default_title = path.rsplit('/').next().unwrap_or(&path);
                let title = args.opt_str("title")?.unwrap_or(default_title);
                self.create_folder(&path, title).await?;
                Ok(format!("Created folder /{DAM_ROOT}/{path}"))
            }
            "aem_delete_asset" => {
                let path = required_asset_path(args)?;
                self.delete_asset(&path).await?;
                Ok(format!("Deleted /{DAM_ROOT}/{path}"))
            }
            "aem_get_page" => {
                let path = content_path(args.str("path")?)?;
                let depth = page_depth(args)?;
                let page = self.get_page(&path, &depth).await?;
                Ok(render_json(&page))
            }
            "aem_search" => {
                let root = content_path(args.opt_str("path")?.unwrap_or(DAM_ROOT))?;
                let limit = args.opt_u64("limit")?.unwrap_or(DEFAULT_SEARCH_LIMIT);
                let mut params = vec![
                    ("path", format!("/{root}")),
                    ("type", args.opt_str("type")?.unwrap_or("dam:Asset").to_owned()),
                ];
                if let Some(fulltext) = args.opt_str("fulltext")? {
                    params.push(("fulltext", fulltext.to_owned()));
                }
                params.push(("p.limit", limit.to_string()));
                params.push(("p.hits", "selective".into()));
                params.push(("p.properties", "jcr:path jcr:title".into()));
                let result = self.search(&params).await?;
                Ok(render_hits(&result))
            }
            "aem_publish" => {
                let path = format!("/{}", content_path(args.str("path")?)?);
                let (command, verb) = match args.opt_str("action")?.unwrap_or("publish") {
                    "publish" => ("Activate", "Published"),
                    "unpublish" => ("Deactivate", "Unpublished"),
                    _ => {
                        return Err(InputError::Invalid {
                            name: "action",
                            reason: "must be \"publish\" or \"unpublish\"",
                        }
                        .into())
                    }
                };
                self.replicate(command, &path).await?;
                Ok(format!("{verb} {path}"))
            }
            other => Err(InputError::UnknownTool(other.to_owned()).into()),
        }
    }
}

fn required_asset_path(args: &Arguments) -> Result<String, InputError> {
    let path = asset_path(args.str("path")?)?;
    if path.is_empty() {
        return Err(InputError::Invalid {
            name: "path",
            reason: "must name an asset or folder below /content/dam",
        });
    }
    Ok(path)
}
