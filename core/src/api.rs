/// REST client for the marketplace backend.
///
/// Every authenticated call reads the stored access token first and sends
/// it as `Authorization: Bearer <token>`. No retries.
use crate::config::Config;
use crate::error::{BazaarError, Result};
use crate::models::{
    ApiEnvelope, AuthPayload, ChatRoomSummary, Credentials, NewPost, Post, PostDetails,
    ProfileUpdate, Registration, User,
};
use crate::store::LocalStore;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    config: Config,
    store: LocalStore,
}

impl ApiClient {
    pub fn new(config: &Config, store: LocalStore) -> Result<Self> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            http,
            config: config.clone(),
            store,
        })
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    fn token(&self) -> Result<String> {
        self.store.access_token()?.ok_or(BazaarError::Unauthenticated)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.config.endpoint(path);
        debug!("{} {}", method, url);
        self.http.request(method, url)
    }

    fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self.token()?;
        Ok(self.request(method, path).bearer_auth(token))
    }

    /// Map a non-2xx response to `Status`, preferring the server's message
    async fn check(res: Response) -> Result<Response> {
        if res.status().is_success() {
            return Ok(res);
        }
        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or(body);
        warn!("Backend responded {}: {}", status, message);
        Err(BazaarError::Status { status, message })
    }

    async fn data<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T> {
        let res = Self::check(builder.send().await?).await?;
        let envelope = res.json::<ApiEnvelope<T>>().await?;
        Ok(envelope.data)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        Self::data(self.authed(Method::GET, path)?).await
    }

    async fn authenticate<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let auth: AuthPayload = Self::data(self.request(Method::POST, path).json(body)).await?;
        self.store.set_access_token(&auth.access_token)?;
        info!("Signed in, access token stored");
        Ok(())
    }

    // ─── Auth ────────────────────────────────────────────────────────────────

    pub async fn signup(&self, registration: &Registration) -> Result<()> {
        self.authenticate("/auth/signup", registration).await
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<()> {
        self.authenticate("/auth/login", credentials).await
    }

    /// Forget the stored token; returns whether one was present
    pub fn logout(&self) -> Result<bool> {
        self.store.clear_access_token()
    }

    // ─── Users ───────────────────────────────────────────────────────────────

    pub async fn my_profile(&self) -> Result<User> {
        self.get("/user/me").await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User> {
        Self::data(self.authed(Method::PUT, "/user/me")?.json(update)).await
    }

    pub async fn user_by_id(&self, id: &str) -> Result<User> {
        self.get(&format!("/user/byId/{}", segment(id))).await
    }

    pub async fn user_by_email(&self, email: &str) -> Result<User> {
        self.get(&format!("/user/{}", segment(email))).await
    }

    // ─── Posts ───────────────────────────────────────────────────────────────

    pub async fn categories(&self) -> Result<Vec<String>> {
        self.get("/posts/categories").await
    }

    pub async fn latest_posts(&self, limit: u32) -> Result<Vec<Post>> {
        self.get(&format!("/posts/latest/{}", limit)).await
    }

    pub async fn posts_by_category(&self, category: &str) -> Result<Vec<Post>> {
        self.get(&format!("/posts/search/category/{}", segment(category)))
            .await
    }

    pub async fn search_posts_by_name(&self, query: &str) -> Result<Vec<Post>> {
        self.get(&format!("/posts/search/name/{}", segment(query)))
            .await
    }

    pub async fn posts_by_author(&self, email: &str) -> Result<Vec<Post>> {
        self.get(&format!("/posts/author/{}", segment(email))).await
    }

    pub async fn post_by_id(&self, id: &str) -> Result<PostDetails> {
        self.get(&format!("/posts/byId/{}", segment(id))).await
    }

    pub async fn create_post(&self, post: &NewPost) -> Result<Post> {
        Self::data(self.authed(Method::POST, "/posts/addNew")?.json(post)).await
    }

    pub async fn delete_post(&self, id: &str) -> Result<()> {
        let builder = self.authed(Method::DELETE, &format!("/posts/delete/{}", segment(id)))?;
        Self::check(builder.send().await?).await?;
        info!("Deleted post {}", id);
        Ok(())
    }

    // ─── Chats ───────────────────────────────────────────────────────────────

    pub async fn my_chats(&self) -> Result<Vec<ChatRoomSummary>> {
        self.get("/chatRoom/me").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_segments_are_encoded() {
        assert_eq!(segment("garden tools"), "garden%20tools");
        assert_eq!(segment("a/b"), "a%2Fb");
        assert_eq!(segment("ann@example.com"), "ann%40example.com");
    }

    #[tokio::test]
    async fn test_authenticated_call_without_token() {
        let client = ApiClient::new(&Config::default(), LocalStore::temporary().unwrap()).unwrap();
        let err = client.categories().await.unwrap_err();
        assert!(matches!(err, BazaarError::Unauthenticated));
    }
}
