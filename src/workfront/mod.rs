//! Adobe Workfront adapter.

use reqwest::Method;
use serde_json::{json, Map, Value};

use crate::{
    auth::{
        client::{AuthenticatedClient, Error, Payload},
        client_credentials::ClientCredentials,
        token_manager::TokenManager,
        ExpiringToken, TokenProvider,
    },
    config::WorkfrontConfig,
    core::{render_json, Adapter, Arguments, InputError, ToolSpec},
    utils::join_segments,
};

const DEFAULT_SEARCH_LIMIT: u64 = 50;

pub struct Provider<AuthTokenProvider>
where
    AuthTokenProvider: TokenProvider,
{
    pub host: reqwest::Url,
    pub api_version: String,
    pub client: AuthenticatedClient<AuthTokenProvider>,
}

/// Build the Workfront adapter authenticating with the configured client credentials.
pub fn connect(config: &WorkfrontConfig, http: reqwest::Client) -> Provider<ClientCredentials> {
    let credentials = ClientCredentials::new(http.clone(), &config.credentials);
    Provider {
        host: config.host.clone(),
        api_version: config.api_version.clone(),
        client: AuthenticatedClient::new(http, TokenManager::new(credentials)),
    }
}

/// Object codes and IDs end up in URL paths; keep them to plain alphanumerics.
fn identifier(args: &Arguments, name: &'static str) -> Result<String, InputError> {
    let value = args.str(name)?;
    if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(InputError::Invalid {
            name,
            reason: "must be alphanumeric",
        });
    }
    Ok(value.to_owned())
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(value) => value.clone(),
        other => other.to_string(),
    }
}

impl<AuthTokenProvider> Provider<AuthTokenProvider>
where
    AuthTokenProvider: TokenProvider,
    <AuthTokenProvider as TokenProvider>::Token: ExpiringToken,
{
    fn build_url(&self, obj_code: &str, rest: Option<&str>, query: &[(String, String)]) -> reqwest::Url {
        let mut segments = vec!["attask", "api", self.api_version.as_str(), obj_code];
        segments.extend(rest);
        let mut url = join_segments(&self.host, segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    async fn data(
        &self,
        method: Method,
        url: reqwest::Url,
        payload: Payload,
    ) -> Result<Value, Error<AuthTokenProvider::Error>> {
        let response: model::Envelope = self
            .client
            .send_json(method, url.as_str(), &payload)
            .await?;
        Ok(response.data)
    }

    pub async fn search(
        &self,
        obj_code: &str,
        filters: &Map<String, Value>,
        fields: &[String],
        limit: u64,
    ) -> Result<Value, Error<AuthTokenProvider::Error>> {
        let mut query: Vec<(String, String)> = filters
            .iter()
            .map(|(key, value)| (key.clone(), query_value(value)))
            .collect();
        if !fields.is_empty() {
            query.push(("fields".into(), fields.join(",")));
        }
        query.push(("$$LIMIT".into(), limit.to_string()));
        let url = self.build_url(obj_code, Some("search"), &query);
        self.data(Method::GET, url, Payload::Empty).await
    }

    pub async fn get(
        &self,
        obj_code: &str,
        id: &str,
        fields: &[String],
    ) -> Result<Value, Error<AuthTokenProvider::Error>> {
        let query = if fields.is_empty() {
            Vec::new()
        } else {
            vec![("fields".to_owned(), fields.join(","))]
        };
        let url = self.build_url(obj_code, Some(id), &query);
        self.data(Method::GET, url, Payload::Empty).await
    }

    pub async fn create(
        &self,
        obj_code: &str,
        data: &Map<String, Value>,
    ) -> Result<Value, Error<AuthTokenProvider::Error>> {
        let url = self.build_url(obj_code, None, &[]);
        self.data(Method::POST, url, Payload::Json(Value::Object(data.clone())))
            .await
    }

    pub async fn update(
        &self,
        obj_code: &str,
        id: &str,
        data: &Map<String, Value>,
    ) -> Result<Value, Error<AuthTokenProvider::Error>> {
        let url = self.build_url(obj_code, Some(id), &[]);
        self.data(Method::PUT, url, Payload::Json(Value::Object(data.clone())))
            .await
    }

    pub async fn delete(
        &self,
        obj_code: &str,
        id: &str,
    ) -> Result<(), Error<AuthTokenProvider::Error>> {
        let url = self.build_url(obj_code, Some(id), &[]);
        self.client
            .send(Method::DELETE, url.as_str(), &Payload::Empty)
            .await?;
        Ok(())
    }
}

fn render_records(obj_code: &str, data: &Value) -> String {
    let records = data.as_array().map(Vec::as_slice).unwrap_or_default();
    let mut out = format!("Found {} {obj_code} record(s):\n", records.len());
    for record in records {
        let id = record.get("ID").and_then(Value::as_str).unwrap_or("?");
        match record.get("name").and_then(Value::as_str) {
            Some(name) => out.push_str(&format!("- {id}: {name}\n")),
            None => out.push_str(&format!("- {id}\n")),
        }
    }
    out
}

mod model {
    use serde::Deserialize;
    use serde_json::Value;

    /// Every Workfront API response wraps its payload in `data`.
    #[derive(Debug, Deserialize)]
    pub struct Envelope {
        #[serde(default)]
        pub data: Value,
    }
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({ "type": "object", "properties": properties, "required": required })
}

#[async_trait::async_trait]
impl<AuthTokenProvider> Adapter for Provider<AuthTokenProvider>
where
    AuthTokenProvider: TokenProvider,
    <AuthTokenProvider as TokenProvider>::Token: ExpiringToken,
    <AuthTokenProvider as TokenProvider>::Error: std::error::Error + 'static,
{
    fn name(&self) -> &'static str {
        "workfront"
    }

    fn tools(&self) -> Vec<ToolSpec> {
        let obj_code = json!({ "type": "string", "description": "Object code, e.g. PROJ, TASK, OPTASK, USER" });
        let fields = json!({ "type": "array", "items": { "type": "string" } });
        vec![
            ToolSpec {
                name: "workfront_search",
                description: "Search Workfront objects by field filters.",
                input_schema: object_schema(
                    json!({
                        "obj_code": obj_code,
                        "filters": { "type": "object" },
                        "fields": fields,
                        "limit": { "type": "integer" },
                    }),
                    &["obj_code"],
                ),
            },
            ToolSpec {
                name: "workfront_get",
                description: "Read one Workfront object by ID.",
                input_schema: object_schema(
                    json!({ "obj_code": obj_code, "id": { "type": "string" }, "fields": fields }),
                    &["obj_code", "id"],
                ),
            },
            ToolSpec {
                name: "workfront_create",
                description: "Create a Workfront object.",
                input_schema: object_schema(
                    json!({ "obj_code": obj_code, "data": { "type": "object" } }),
                    &["obj_code", "data"],
                ),
            },
            ToolSpec {
                name: "workfront_update",
                description: "Update fields of a Workfront object.",
                input_schema: object_schema(
                    json!({ "obj_code": obj_code, "id": { "type": "string" }, "data": { "type": "object" } }),
                    &["obj_code", "id", "data"],
                ),
            },
            ToolSpec {
                name: "workfront_delete",
                description: "Delete a Workfront object.",
                input_schema: object_schema(
                    json!({ "obj_code": obj_code, "id": { "type": "string" } }),
                    &["obj_code", "id"],
                ),
            },
        ]
    }

    async fn call(&self, tool: &str, args: &Arguments) -> Result<String, anyhow::Error> {
        match tool {
            "workfront_search" => {
                let obj_code = identifier(args, "obj_code")?;
                let empty = Map::new();
                let filters = args.opt_object("filters")?.unwrap_or(&empty);
                let fields = args.opt_list("fields")?;
                let limit = args.opt_u64("limit")?.unwrap_or(DEFAULT_SEARCH_LIMIT);
                let data = self.search(&obj_code, filters, &fields, limit).await?;
                Ok(render_records(&obj_code, &data))
            }
            "workfront_get" => {
                let obj_code = identifier(args, "obj_code")?;
                let id = identifier(args, "id")?;
                let fields = args.opt_list("fields")?;
                let data = self.get(&obj_code, &id, &fields).await?;
                Ok(render_json(&data))
            }
            "workfront_create" => {
                let obj_code = identifier(args, "obj_code")?;
                let data = self.create(&obj_code, args.object("data")?).await?;
                Ok(format!("Created {obj_code}:\n{}", render_json(&data)))
            }
            "workfront_update" => {
                let obj_code = identifier(args, "obj_code")?;
                let id = identifier(args, "id")?;
                let data = self.update(&obj_code, &id, args.object("data")?).await?;
                Ok(format!("Updated {obj_code} {id}:\n{}", render_json(&data)))
            }
            "workfront_delete" => {
                let obj_code = identifier(args, "obj_code")?;
                let id = identifier(args, "id")?;
                self.delete(&obj_code, &id).await?;
                Ok(format!("Deleted {obj_code} {id}"))
            }
            other => Err(InputError::UnknownTool(other.to_owned()).into()),
        }
    }
}
