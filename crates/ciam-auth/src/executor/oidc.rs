use std::sync::Arc;

use async_trait::async_trait;
use ciam_core::{
    ExecutionRecord, Executor, ExecutorError, ExecutorResponse, ExecutorStatus, ExecutorType,
    InputData, NodeContext, Outcome, proceed,
};
use serde_json::Value;

use super::oauth::{OAuthExecutor, claim_subject, classify};
use super::{
    CODE_INPUT, ENRICHMENT_DENIED_CLAIMS, ID_TOKEN_NOT_FOUND_REASON, NONCE_INPUT,
    NONCE_MISMATCH_REASON, NONCE_REQUIRED_REASON, OIDC_EXECUTOR_NAME,
    SUB_NOT_FOUND_IN_ID_TOKEN_REASON,
};
use crate::capability::{Claims, OidcProvider, without_keys};
use crate::config::{ExecutorPolicies, NoncePolicy};
use crate::directory::UserDirectory;
use crate::idp::IdentityProviderService;

/// Protocol claims removed from the ID token before it becomes identity
/// attributes.
pub const ID_TOKEN_DENIED_CLAIMS: &[&str] = &[
    "aud", "exp", "iat", "iss", "at_hash", "azp", "nonce", "sub",
];

/// OpenID Connect authorization-code executor.
///
/// Runs the same two-phase flow as [`OAuthExecutor`], but takes the subject
/// from the validated ID token instead of the userinfo endpoint. Userinfo is
/// only called to enrich attributes when the client requests scopes beyond
/// `openid`, and only after the subject has been resolved locally.
pub struct OidcAuthExecutor<P: ?Sized> {
    base: OAuthExecutor<P>,
    record_execution: bool,
}

impl<P: OidcProvider + ?Sized> OidcAuthExecutor<P> {
    #[must_use]
    pub fn new(
        provider: Arc<P>,
        idp_service: Arc<dyn IdentityProviderService>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            base: OAuthExecutor::new(provider, idp_service, directory).with_name(OIDC_EXECUTOR_NAME),
            record_execution: false,
        }
    }

    /// Registers the executor under a different name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.base = self.base.with_name(name);
        self
    }

    #[must_use]
    pub fn with_policies(mut self, policies: ExecutorPolicies) -> Self {
        self.base = self.base.with_policies(policies);
        self
    }

    /// Attaches an execution record to every authenticated completion.
    #[must_use]
    pub fn with_execution_record(mut self, enabled: bool) -> Self {
        self.record_execution = enabled;
        self
    }

    /// The underlying authorization-code executor.
    pub fn base(&self) -> &OAuthExecutor<P> {
        &self.base
    }

    /// Validates the ID token and returns its claims.
    pub async fn id_token_claims(
        &self,
        ctx: &NodeContext,
        idp_id: &str,
        id_token: &str,
    ) -> Result<Outcome<Claims>, ExecutorError> {
        classify(
            ctx,
            self.base.provider().id_token_claims(idp_id, id_token).await,
            "failed to extract claims from the ID token",
        )
    }

    /// Compares the submitted nonce with the ID token's `nonce` claim.
    ///
    /// The comparison is exact, including case.
    pub fn validate_nonce(&self, ctx: &NodeContext, claims: &Claims) -> Outcome<()> {
        let token_nonce = claims.get("nonce").and_then(Value::as_str);

        match ctx.input(NONCE_INPUT) {
            Some(expected) if token_nonce == Some(expected) => Outcome::Proceed(()),
            Some(_) => {
                tracing::warn!(flow_id = %ctx.flow_id, "ID token nonce does not match the submitted nonce");
                Outcome::fail(NONCE_MISMATCH_REASON)
            }
            None if self.base.policies().nonce == NoncePolicy::Required => {
                Outcome::fail(NONCE_REQUIRED_REASON)
            }
            None => Outcome::Proceed(()),
        }
    }

    /// Merges userinfo claims into `attributes` when the client asks for
    /// more than the `openid` scope.
    pub async fn enrich_attributes(
        &self,
        ctx: &NodeContext,
        idp_id: &str,
        access_token: &str,
        mut attributes: Claims,
    ) -> Result<Outcome<Claims>, ExecutorError> {
        let config = match self.base.provider().oauth_client_config(idp_id).await {
            Ok(config) => config,
            Err(e) if e.is_client_error() => {
                return Ok(Outcome::Fail(format!(
                    "failed to retrieve OAuth client configuration: {}",
                    e.description
                )));
            }
            Err(e) => {
                tracing::error!(
                    flow_id = %ctx.flow_id,
                    idp_id = %idp_id,
                    error_code = %e.code,
                    "Failed to retrieve OAuth client configuration: {}",
                    e.description
                );
                return Err(ExecutorError::internal(
                    "failed to retrieve OAuth client configuration",
                ));
            }
        };

        if !config.requests_profile_scopes() {
            tracing::debug!(flow_id = %ctx.flow_id, "Only openid scope requested, skipping userinfo");
            return Ok(Outcome::Proceed(attributes));
        }

        let userinfo = proceed!(
            self.base.user_info(ctx, idp_id, access_token).await?,
            reason => Outcome::Fail(reason)
        );
        attributes.extend(without_keys(userinfo, ENRICHMENT_DENIED_CLAIMS));

        Ok(Outcome::Proceed(attributes))
    }

    /// Handles the callback invocation carrying the authorization code.
    pub async fn process_auth_flow_response(
        &self,
        ctx: &NodeContext,
    ) -> Result<ExecutorResponse, ExecutorError> {
        let Some(code) = ctx.input(CODE_INPUT) else {
            return Ok(self.base.finalize(ctx, None));
        };
        let idp_id = self.base.idp_id(ctx)?;

        let token = proceed!(
            self.base.exchange_code_for_token(ctx, &idp_id, code).await?,
            reason => ExecutorResponse::failure(reason)
        );

        let Some(id_token) = token.id_token() else {
            return Ok(ExecutorResponse::failure(ID_TOKEN_NOT_FOUND_REASON));
        };

        let claims = proceed!(
            self.id_token_claims(ctx, &idp_id, id_token).await?,
            reason => ExecutorResponse::failure(reason)
        );

        proceed!(
            self.validate_nonce(ctx, &claims),
            reason => ExecutorResponse::failure(reason)
        );

        let Some(sub) = claim_subject(&claims) else {
            return Ok(ExecutorResponse::failure(SUB_NOT_FOUND_IN_ID_TOKEN_REASON));
        };

        let resolution = proceed!(
            self.base.resolve(ctx, &sub).await?,
            reason => ExecutorResponse::failure(reason)
        );

        let attributes = without_keys(claims, ID_TOKEN_DENIED_CLAIMS);
        let attributes = proceed!(
            self.enrich_attributes(ctx, &idp_id, &token.access_token, attributes)
                .await?,
            reason => ExecutorResponse::failure(reason)
        );

        Ok(self.base.finalize(ctx, Some(resolution.into_identity(attributes))))
    }

    fn with_audit(&self, response: ExecutorResponse) -> ExecutorResponse {
        if !self.record_execution
            || response.status() != ExecutorStatus::Complete
            || !response.is_authenticated()
        {
            return response;
        }

        response.with_execution_record(ExecutionRecord::now(
            self.base.executor_name(),
            ExecutorType::Authentication,
            ExecutorStatus::Complete,
        ))
    }
}

#[async_trait]
impl<P> Executor for OidcAuthExecutor<P>
where
    P: OidcProvider + ?Sized + 'static,
{
    fn name(&self) -> &str {
        self.base.executor_name()
    }

    fn executor_type(&self) -> ExecutorType {
        ExecutorType::Authentication
    }

    fn default_inputs(&self) -> Vec<InputData> {
        vec![
            InputData::required(CODE_INPUT),
            InputData::optional(NONCE_INPUT),
        ]
    }

    async fn execute(&self, ctx: &NodeContext) -> Result<ExecutorResponse, ExecutorError> {
        tracing::debug!(flow_id = %ctx.flow_id, executor = %self.name(), "Executing OIDC executor");

        let response = if self.base.check_input_data(ctx) {
            self.base.build_authorize_flow(ctx).await?
        } else {
            self.process_auth_flow_response(ctx).await?
        };

        Ok(self.with_audit(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{OAuthClientConfig, OAuthEndpoints, OAuthProvider, TokenResponse};
    use crate::config::EmptyScopePolicy;
    use crate::directory::{InMemoryUserDirectory, LocalUser};
    use crate::executor::{AUTHENTICATION_FAILED_REASON, IDP_ID_PROPERTY};
    use crate::idp::{IdentityProvider, IdentityProviderRegistry, IdpType};
    use crate::resolution::USER_NOT_FOUND_REASON;
    use ciam_core::{FlowType, ServiceError};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct MockOidcProvider {
        token_result: Result<TokenResponse, ServiceError>,
        claims_result: Result<Claims, ServiceError>,
        userinfo: Claims,
        config_result: Result<OAuthClientConfig, ServiceError>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl MockOidcProvider {
        fn new() -> Self {
            Self {
                token_result: Ok(TokenResponse {
                    access_token: "access-1".to_string(),
                    token_type: "Bearer".to_string(),
                    scope: "openid email profile".to_string(),
                    id_token: Some("header.payload.signature".to_string()),
                    ..TokenResponse::default()
                }),
                claims_result: Ok(Claims::from([
                    ("iss".to_string(), Value::from("https://idp.example.com")),
                    ("aud".to_string(), Value::from("client-1")),
                    ("azp".to_string(), Value::from("client-1")),
                    ("exp".to_string(), Value::from(4_102_444_800_i64)),
                    ("iat".to_string(), Value::from(1_700_000_000_i64)),
                    ("at_hash".to_string(), Value::from("hash")),
                    ("sub".to_string(), Value::from("ext-1")),
                    ("nonce".to_string(), Value::from("abc")),
                    ("email".to_string(), Value::from("ada@example.com")),
                ])),
                userinfo: Claims::from([
                    ("sub".to_string(), Value::from("ext-1")),
                    ("id".to_string(), Value::from("internal-idp-id")),
                    ("username".to_string(), Value::from("ada")),
                    ("given_name".to_string(), Value::from("Ada")),
                    ("email".to_string(), Value::from("ada@work.example.com")),
                ]),
                config_result: Ok(client_config(vec!["openid", "email"])),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }
    }

    fn client_config(scopes: Vec<&str>) -> OAuthClientConfig {
        OAuthClientConfig {
            client_id: "client-1".to_string(),
            client_secret: None,
            redirect_uri: "https://app.example.com/callback".to_string(),
            scopes: scopes.into_iter().map(String::from).collect(),
            endpoints: OAuthEndpoints {
                authorization_endpoint: "https://idp.example.com/authorize".to_string(),
                token_endpoint: "https://idp.example.com/token".to_string(),
                userinfo_endpoint: "https://idp.example.com/userinfo".to_string(),
                jwks_endpoint: Some("https://idp.example.com/jwks".to_string()),
            },
            additional_params: BTreeMap::new(),
        }
    }

    #[async_trait]
    impl OAuthProvider for MockOidcProvider {
        async fn build_authorize_url(&self, _idp_id: &str) -> Result<String, ServiceError> {
            self.record("authorize");
            Ok("https://idp.example.com/authorize?scope=openid".to_string())
        }

        async fn exchange_code_for_token(
            &self,
            _idp_id: &str,
            _code: &str,
            _validate_response: bool,
        ) -> Result<TokenResponse, ServiceError> {
            self.record("token");
            self.token_result.clone()
        }

        async fn fetch_user_info(
            &self,
            _idp_id: &str,
            _access_token: &str,
        ) -> Result<Claims, ServiceError> {
            self.record("userinfo");
            Ok(self.userinfo.clone())
        }

        async fn oauth_client_config(
            &self,
            _idp_id: &str,
        ) -> Result<OAuthClientConfig, ServiceError> {
            self.record("client_config");
            self.config_result.clone()
        }
    }

    #[async_trait]
    impl OidcProvider for MockOidcProvider {
        async fn id_token_claims(
            &self,
            _idp_id: &str,
            id_token: &str,
        ) -> Result<Claims, ServiceError> {
            assert_eq!(id_token, "header.payload.signature");
            self.record("id_token");
            self.claims_result.clone()
        }
    }

    fn create_executor(provider: MockOidcProvider) -> OidcAuthExecutor<MockOidcProvider> {
        let registry = Arc::new(IdentityProviderRegistry::with_providers([
            IdentityProvider::new("idp-1", "Example OIDC", IdpType::Oidc, "client-1"),
        ]));
        let directory = Arc::new(InMemoryUserDirectory::with_users([
            LocalUser::new("u-1").with_subject("ext-1"),
        ]));
        OidcAuthExecutor::new(Arc::new(provider), registry, directory)
    }

    fn callback_ctx(flow_type: FlowType) -> NodeContext {
        NodeContext::new("flow-1", flow_type)
            .with_node_property(IDP_ID_PROPERTY, "idp-1")
            .with_user_input(CODE_INPUT, "auth-code")
    }

    #[tokio::test]
    async fn test_redirect_without_code() {
        let executor = create_executor(MockOidcProvider::new());
        let ctx = NodeContext::new("flow-1", FlowType::Authentication)
            .with_node_property(IDP_ID_PROPERTY, "idp-1")
            .with_user_input(NONCE_INPUT, "abc");
        let resp = executor.execute(&ctx).await.unwrap();
        assert_eq!(resp.status(), ExecutorStatus::ExternalRedirection);
        assert_eq!(resp.additional_data().get("idpName").unwrap(), "Example OIDC");
        assert_eq!(executor.base().provider().calls(), vec!["authorize"]);
    }

    #[tokio::test]
    async fn test_login_with_enrichment() {
        let executor = create_executor(MockOidcProvider::new());
        let ctx = callback_ctx(FlowType::Authentication).with_user_input(NONCE_INPUT, "abc");
        let resp = executor.execute(&ctx).await.unwrap();

        assert_eq!(resp.status(), ExecutorStatus::Complete);
        let user = resp.authenticated_user().unwrap();
        assert!(user.is_authenticated);
        assert_eq!(user.user_id.as_deref(), Some("u-1"));
        for claim in ID_TOKEN_DENIED_CLAIMS {
            assert!(!user.attributes.contains_key(*claim), "{claim} leaked");
        }
        assert!(!user.attributes.contains_key("username"));
        assert!(!user.attributes.contains_key("id"));
        assert_eq!(user.attribute_str("given_name"), Some("Ada"));
        assert_eq!(user.attribute_str("email"), Some("ada@work.example.com"));
        assert_eq!(
            resp.runtime_data().get("email").unwrap(),
            "ada@work.example.com"
        );
        assert!(resp.execution_record().is_none());
        assert_eq!(
            executor.base().provider().calls(),
            vec!["token", "id_token", "client_config", "userinfo"]
        );
    }

    #[tokio::test]
    async fn test_openid_only_skips_userinfo() {
        let mut provider = MockOidcProvider::new();
        provider.config_result = Ok(client_config(vec!["openid"]));
        let executor = create_executor(provider);

        let resp = executor
            .execute(&callback_ctx(FlowType::Authentication))
            .await
            .unwrap();
        assert_eq!(resp.status(), ExecutorStatus::Complete);
        assert_eq!(
            resp.authenticated_user().unwrap().attribute_str("email"),
            Some("ada@example.com")
        );
        assert!(!executor.base().provider().calls().contains(&"userinfo"));
    }

    #[tokio::test]
    async fn test_nonce_mismatch_is_case_sensitive() {
        let executor = create_executor(MockOidcProvider::new());
        let ctx = callback_ctx(FlowType::Authentication).with_user_input(NONCE_INPUT, "ABC");
        let resp = executor.execute(&ctx).await.unwrap();
        assert_eq!(resp.status(), ExecutorStatus::Failure);
        assert_eq!(resp.failure_reason(), Some(NONCE_MISMATCH_REASON));
        assert_eq!(executor.base().provider().calls(), vec!["token", "id_token"]);
    }

    #[tokio::test]
    async fn test_nonce_claim_missing_with_input() {
        let mut provider = MockOidcProvider::new();
        provider.claims_result.as_mut().unwrap().remove("nonce");
        let ctx = callback_ctx(FlowType::Authentication).with_user_input(NONCE_INPUT, "abc");
        let resp = create_executor(provider).execute(&ctx).await.unwrap();
        assert_eq!(resp.failure_reason(), Some(NONCE_MISMATCH_REASON));
    }

    #[tokio::test]
    async fn test_nonce_required_policy() {
        let executor = create_executor(MockOidcProvider::new()).with_policies(
            ExecutorPolicies::default().with_nonce(NoncePolicy::Required),
        );

        let resp = executor
            .execute(&callback_ctx(FlowType::Authentication))
            .await
            .unwrap();
        assert_eq!(resp.failure_reason(), Some(NONCE_REQUIRED_REASON));

        let ctx = callback_ctx(FlowType::Authentication).with_user_input(NONCE_INPUT, "abc");
        let resp = executor.execute(&ctx).await.unwrap();
        assert_eq!(resp.status(), ExecutorStatus::Complete);
    }

    #[tokio::test]
    async fn test_missing_id_token() {
        let mut provider = MockOidcProvider::new();
        provider.token_result.as_mut().unwrap().id_token = None;
        let resp = create_executor(provider)
            .execute(&callback_ctx(FlowType::Authentication))
            .await
            .unwrap();
        assert_eq!(resp.failure_reason(), Some(ID_TOKEN_NOT_FOUND_REASON));
    }

    #[tokio::test]
    async fn test_missing_sub_in_id_token() {
        let mut provider = MockOidcProvider::new();
        provider.claims_result.as_mut().unwrap().remove("sub");
        let resp = create_executor(provider)
            .execute(&callback_ctx(FlowType::Authentication))
            .await
            .unwrap();
        assert_eq!(resp.failure_reason(), Some(SUB_NOT_FOUND_IN_ID_TOKEN_REASON));
    }

    #[tokio::test]
    async fn test_id_token_errors() {
        let mut provider = MockOidcProvider::new();
        provider.claims_result = Err(ServiceError::client(
            "IDP-1004",
            "Invalid ID token",
            "ID token has expired",
        ));
        let resp = create_executor(provider)
            .execute(&callback_ctx(FlowType::Authentication))
            .await
            .unwrap();
        assert_eq!(resp.failure_reason(), Some("ID token has expired"));

        let mut provider = MockOidcProvider::new();
        provider.claims_result = Err(ServiceError::server("IDP-5003", "JWKS", "HTTP 500"));
        let err = create_executor(provider)
            .execute(&callback_ctx(FlowType::Authentication))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "failed to extract claims from the ID token");
    }

    #[tokio::test]
    async fn test_unknown_user_skips_enrichment() {
        let mut provider = MockOidcProvider::new();
        provider
            .claims_result
            .as_mut()
            .unwrap()
            .insert("sub".to_string(), Value::from("ext-2"));
        let executor = create_executor(provider);
        let resp = executor
            .execute(&callback_ctx(FlowType::Authentication))
            .await
            .unwrap();
        assert_eq!(resp.failure_reason(), Some(USER_NOT_FOUND_REASON));
        assert_eq!(executor.base().provider().calls(), vec!["token", "id_token"]);
    }

    #[tokio::test]
    async fn test_registration_draft() {
        let mut provider = MockOidcProvider::new();
        provider
            .claims_result
            .as_mut()
            .unwrap()
            .insert("sub".to_string(), Value::from("ext-2"));
        let executor = create_executor(provider).with_execution_record(true);
        let resp = executor
            .execute(&callback_ctx(FlowType::Registration))
            .await
            .unwrap();

        assert_eq!(resp.status(), ExecutorStatus::Complete);
        let user = resp.authenticated_user().unwrap();
        assert!(!user.is_authenticated);
        assert_eq!(user.attribute_str("given_name"), Some("Ada"));
        assert_eq!(resp.runtime_data().get("sub").unwrap(), "ext-2");
        assert!(resp.execution_record().is_none());
    }

    #[tokio::test]
    async fn test_client_config_errors() {
        let mut provider = MockOidcProvider::new();
        provider.config_result = Err(ServiceError::client(
            "IDP-1001",
            "Not found",
            "Identity provider not found: idp-1",
        ));
        let resp = create_executor(provider)
            .execute(&callback_ctx(FlowType::Authentication))
            .await
            .unwrap();
        assert_eq!(
            resp.failure_reason(),
            Some("failed to retrieve OAuth client configuration: Identity provider not found: idp-1")
        );

        let mut provider = MockOidcProvider::new();
        provider.config_result = Err(ServiceError::server("IDP-5001", "Config", "broken"));
        let err = create_executor(provider)
            .execute(&callback_ctx(FlowType::Authentication))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "failed to retrieve OAuth client configuration");
    }

    #[tokio::test]
    async fn test_execution_record_on_authenticated_completion() {
        let executor = create_executor(MockOidcProvider::new())
            .with_name("CustomOIDC")
            .with_execution_record(true);
        let resp = executor
            .execute(&callback_ctx(FlowType::Authentication))
            .await
            .unwrap();

        let record = resp.execution_record().unwrap();
        assert_eq!(record.executor_name, "CustomOIDC");
        assert_eq!(record.executor_type, ExecutorType::Authentication);
        assert_eq!(record.status, ExecutorStatus::Complete);
        assert!(record.timestamp > 0);
    }

    #[tokio::test]
    async fn test_oidc_ignores_empty_scope_guard() {
        let mut provider = MockOidcProvider::new();
        provider.token_result.as_mut().unwrap().scope = String::new();
        let executor = create_executor(provider).with_policies(
            ExecutorPolicies::default().with_empty_scope(EmptyScopePolicy::TreatAsUnauthenticated),
        );
        let resp = executor
            .execute(&callback_ctx(FlowType::Authentication))
            .await
            .unwrap();
        assert_eq!(resp.status(), ExecutorStatus::Complete);
        assert_ne!(resp.failure_reason(), Some(AUTHENTICATION_FAILED_REASON));
    }

    #[test]
    fn test_default_inputs() {
        let executor = create_executor(MockOidcProvider::new());
        assert_eq!(executor.name(), OIDC_EXECUTOR_NAME);
        let ctx = NodeContext::new("f", FlowType::Authentication);
        assert_eq!(
            executor.missing_inputs(&ctx),
            vec![InputData::required(CODE_INPUT)]
        );
    }
}
