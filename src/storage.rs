use anyhow::{anyhow, Context};
use async_trait::async_trait;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, bucket: &str, path: &str) -> anyhow::Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub base_url: String,
    pub service_key: String,
    pub bucket: String,
}

/// Object storage reached over HTTP at
/// `{base_url}/storage/v1/object/{bucket}/{path}`.
#[derive(Clone)]
pub struct HttpObjectStore {
    base_url: String,
    service_key: String,
    client: reqwest::Client,
}

impl HttpObjectStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            bucket,
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn download(&self, bucket: &str, path: &str) -> anyhow::Result<Vec<u8>> {
        let url = self.object_url(bucket, path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .send()
            .await
            .with_context(|| format!("failed to request {bucket}/{path}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("download of {bucket}/{path} returned {status}"));
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {bucket}/{path}"))?;
        Ok(bytes.to_vec())
    }
}

/// Lossy UTF-8 decoding; exports from shop systems are not always clean.
pub fn bytes_to_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn store_for(server: &Server) -> HttpObjectStore {
        HttpObjectStore::new(&StorageConfig {
            base_url: format!("{}/", server.url()),
            service_key: "service-key".to_string(),
            bucket: "shop-intakes".to_string(),
        })
    }

    #[tokio::test]
    async fn downloads_object_bytes() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/storage/v1/object/shop-intakes/shop-1/parts.csv")
            .match_header("authorization", "Bearer service-key")
            .match_header("apikey", "service-key")
            .with_status(200)
            .with_body("Description,Total\nOil change,45\n")
            .create_async()
            .await;

        let bytes = store_for(&server)
            .download("shop-intakes", "/shop-1/parts.csv")
            .await
            .unwrap();

        assert_eq!(bytes_to_text(&bytes), "Description,Total\nOil change,45\n");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_object_is_an_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/storage/v1/object/shop-intakes/missing.csv")
            .with_status(404)
            .create_async()
            .await;

        let result = store_for(&server).download("shop-intakes", "missing.csv").await;
        assert!(result.is_err());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        assert_eq!(bytes_to_text(b"Oil \xff change"), "Oil \u{fffd} change");
    }
}
