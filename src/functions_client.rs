use serde_json::Value;

use crate::config::Config;

/// Best-effort HTTP calls to the Deno function runtime. Both legs swallow
/// transport failures into a `{"success": false, "message": ...}` value
/// rather than propagating an error, matching the source's `deploy_to_deno`/
/// `undeploy_from_deno` which never let a runtime outage fail the request
/// that triggered it.
pub struct FunctionsClient<'a> {
    client: &'a reqwest::Client,
    base_url: String,
}

impl<'a> FunctionsClient<'a> {
    pub fn new(client: &'a reqwest::Client, config: &Config) -> Self {
        Self { client, base_url: config.functions_base_url() }
    }

    pub async fn deploy(&self, name: &str, code: &str, env_vars: &Value) -> Value {
        let body = serde_json::json!({ "functionName": name, "code": code, "env": env_vars });
        match self
            .client
            .post(format!("{}/deploy", self.base_url))
            .timeout(std::time::Duration::from_secs(30))
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp.json().await.unwrap_or_else(|e| {
                serde_json::json!({ "success": false, "message": e.to_string() })
            }),
            Err(e) => serde_json::json!({ "success": false, "message": e.to_string() }),
        }
    }

    pub async fn undeploy(&self, name: &str) -> Value {
        match self
            .client
            .delete(format!("{}/functions/{name}", self.base_url))
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
        {
            Ok(resp) => resp.json().await.unwrap_or_else(|e| {
                serde_json::json!({ "success": false, "message": e.to_string() })
            }),
            Err(e) => serde_json::json!({ "success": false, "message": e.to_string() }),
        }
    }

    /// Invokes a deployed function with a webhook delivery's payload.
    /// Returns the upstream status code alongside its JSON body so the
    /// caller can record both on the delivery row.
    pub async fn invoke(&self, name: &str, payload: &Value, delivery_id: uuid::Uuid) -> Result<(u16, Value), String> {
        let body = serde_json::json!({ "payload": payload, "delivery_id": delivery_id.to_string() });
        let resp = self
            .client
            .post(format!("{}/invoke/{name}", self.base_url))
            .timeout(std::time::Duration::from_secs(30))
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = resp.status().as_u16();
        let json = resp.json().await.unwrap_or(Value::Null);
        Ok((status, json))
    }
}
