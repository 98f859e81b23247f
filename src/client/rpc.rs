//! Client-side wire call: POST a `commit` [`Request`] to a
//! [`ServerRef`]'s proxy URL and parse the [`Response`].

use crate::codec::{Request, Response};
use crate::config::ServerRef;
use crate::error::{Error, Result};

pub async fn call_commit(server: &ServerRef, params: Vec<serde_json::Value>) -> Result<Response> {
    let client = reqwest::Client::builder()
        .timeout(server.timeout())
        .build()
        .map_err(|e| Error::Http(e.to_string()))?;

    let request = Request {
        method: "commit".to_string(),
        params,
    };

    let resp = client
        .post(server.proxy_url())
        .json(&request)
        .send()
        .await
        .map_err(|e| Error::Http(e.to_string()))?;

    resp.json::<Response>().await.map_err(|e| Error::Http(e.to_string()))
}
