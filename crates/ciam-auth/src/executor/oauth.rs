use std::sync::Arc;

use async_trait::async_trait;
use ciam_core::{
    Executor, ExecutorError, ExecutorResponse, ExecutorType, InputData, NodeContext, Outcome,
    ServiceError, proceed,
};
use serde_json::Value;

use super::{
    AUTHENTICATION_FAILED_REASON, CODE_INPUT, IDP_ID_PROPERTY, IDP_NAME_KEY,
    OAUTH_EXECUTOR_NAME, SUB_NOT_FOUND_IN_RESPONSE_REASON, USERINFO_DENIED_CLAIMS,
};
use crate::capability::{Claims, OAuthProvider, TokenResponse, without_keys};
use crate::config::{EmptyScopePolicy, ExecutorPolicies};
use crate::directory::UserDirectory;
use crate::idp::IdentityProviderService;
use crate::resolution::{Resolution, ResolvedIdentity, resolve_user};

/// Two-phase OAuth 2.0 authorization-code executor.
///
/// The first invocation (no `code` input) answers with a redirect to the
/// provider's authorization endpoint. The callback invocation exchanges the
/// code, reads the user's claims and maps the external subject to a local
/// account.
///
/// The provider capability `P` decides how each protocol step talks to the
/// identity provider; the executor only decides what the outcome means for
/// the flow.
pub struct OAuthExecutor<P: ?Sized> {
    name: String,
    provider: Arc<P>,
    idp_service: Arc<dyn IdentityProviderService>,
    directory: Arc<dyn UserDirectory>,
    policies: ExecutorPolicies,
}

impl<P: OAuthProvider + ?Sized> OAuthExecutor<P> {
    #[must_use]
    pub fn new(
        provider: Arc<P>,
        idp_service: Arc<dyn IdentityProviderService>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            name: OAUTH_EXECUTOR_NAME.to_string(),
            provider,
            idp_service,
            directory,
            policies: ExecutorPolicies::default(),
        }
    }

    /// Registers the executor under a different name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_policies(mut self, policies: ExecutorPolicies) -> Self {
        self.policies = policies;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn policies(&self) -> ExecutorPolicies {
        self.policies
    }

    pub fn executor_name(&self) -> &str {
        &self.name
    }

    /// Returns `true` when the authorization code is still missing.
    pub fn check_input_data(&self, ctx: &NodeContext) -> bool {
        ctx.input(CODE_INPUT).is_none()
    }

    /// Reads the identity provider id from the node configuration.
    ///
    /// # Errors
    ///
    /// A missing, empty or non-string `idpId` is a configuration error.
    pub fn idp_id(&self, ctx: &NodeContext) -> Result<String, ExecutorError> {
        ctx.node_property(IDP_ID_PROPERTY)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                tracing::error!(
                    flow_id = %ctx.flow_id,
                    executor = %self.name,
                    "Identity provider id is not configured on the node"
                );
                ExecutorError::configuration("idpId is not configured in node properties")
            })
    }

    /// Starts the flow by redirecting the user agent to the provider.
    pub async fn build_authorize_flow(
        &self,
        ctx: &NodeContext,
    ) -> Result<ExecutorResponse, ExecutorError> {
        let idp_id = self.idp_id(ctx)?;

        let url = proceed!(
            classify(
                ctx,
                self.provider.build_authorize_url(&idp_id).await,
                "failed to build authorize URL",
            )?,
            reason => ExecutorResponse::failure(reason)
        );

        let idp = self
            .idp_service
            .get_identity_provider(&idp_id)
            .await
            .map_err(|e| {
                tracing::error!(
                    flow_id = %ctx.flow_id,
                    idp_id = %idp_id,
                    error_code = %e.code,
                    "Failed to retrieve identity provider: {}",
                    e.description
                );
                ExecutorError::internal("failed to retrieve identity provider")
            })?;

        tracing::debug!(
            flow_id = %ctx.flow_id,
            idp_id = %idp_id,
            "Redirecting to identity provider {}",
            idp.name
        );

        Ok(ExecutorResponse::redirect(url).with_additional_data(IDP_NAME_KEY, idp.name))
    }

    /// Exchanges the authorization code for tokens.
    pub async fn exchange_code_for_token(
        &self,
        ctx: &NodeContext,
        idp_id: &str,
        code: &str,
    ) -> Result<Outcome<TokenResponse>, ExecutorError> {
        classify(
            ctx,
            self.provider.exchange_code_for_token(idp_id, code, true).await,
            "failed to exchange code for token",
        )
    }

    /// Fetches the user's claims from the provider.
    pub async fn user_info(
        &self,
        ctx: &NodeContext,
        idp_id: &str,
        access_token: &str,
    ) -> Result<Outcome<Claims>, ExecutorError> {
        classify(
            ctx,
            self.provider.fetch_user_info(idp_id, access_token).await,
            "failed to fetch user information",
        )
    }

    /// Maps an external subject to a local account for this flow.
    pub async fn resolve(
        &self,
        ctx: &NodeContext,
        sub: &str,
    ) -> Result<Outcome<Resolution>, ExecutorError> {
        resolve_user(self.directory.as_ref(), sub, ctx.flow_type).await
    }

    /// Handles the callback invocation carrying the authorization code.
    pub async fn process_auth_flow_response(
        &self,
        ctx: &NodeContext,
    ) -> Result<ExecutorResponse, ExecutorError> {
        let Some(code) = ctx.input(CODE_INPUT) else {
            return Ok(self.finalize(ctx, None));
        };
        let idp_id = self.idp_id(ctx)?;

        let token = proceed!(
            self.exchange_code_for_token(ctx, &idp_id, code).await?,
            reason => ExecutorResponse::failure(reason)
        );

        if token.has_empty_scope() && self.policies.empty_scope == EmptyScopePolicy::TreatAsUnauthenticated
        {
            tracing::warn!(
                flow_id = %ctx.flow_id,
                idp_id = %idp_id,
                "Token response granted no scope, treating user as unauthenticated"
            );
            return Ok(self.finalize(ctx, None));
        }

        let claims = proceed!(
            self.user_info(ctx, &idp_id, &token.access_token).await?,
            reason => ExecutorResponse::failure(reason)
        );

        let Some(sub) = claim_subject(&claims) else {
            return Ok(ExecutorResponse::failure(SUB_NOT_FOUND_IN_RESPONSE_REASON));
        };

        let resolution = proceed!(
            self.resolve(ctx, &sub).await?,
            reason => ExecutorResponse::failure(reason)
        );

        let attributes = without_keys(claims, USERINFO_DENIED_CLAIMS);
        Ok(self.finalize(ctx, Some(resolution.into_identity(attributes))))
    }

    /// Builds the final response from the resolved identity.
    ///
    /// An authenticated identity completes the step. Outside registration
    /// anything else fails. In registration a provisioning draft completes
    /// the step, and no identity at all leaves it incomplete.
    pub fn finalize(
        &self,
        ctx: &NodeContext,
        identity: Option<ResolvedIdentity>,
    ) -> ExecutorResponse {
        match identity {
            Some(ResolvedIdentity { user, runtime_data })
                if user.is_authenticated || ctx.is_registration() =>
            {
                tracing::debug!(
                    flow_id = %ctx.flow_id,
                    executor = %self.name,
                    authenticated = user.is_authenticated,
                    "External identity resolved"
                );
                ExecutorResponse::complete(user).with_runtime_data(runtime_data)
            }
            _ if !ctx.is_registration() => {
                ExecutorResponse::failure(AUTHENTICATION_FAILED_REASON)
            }
            _ => ExecutorResponse::incomplete(vec![InputData::required(CODE_INPUT)]),
        }
    }
}

#[async_trait]
impl<P> Executor for OAuthExecutor<P>
where
    P: OAuthProvider + ?Sized + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn executor_type(&self) -> ExecutorType {
        ExecutorType::Authentication
    }

    fn default_inputs(&self) -> Vec<InputData> {
        vec![InputData::required(CODE_INPUT)]
    }

    async fn execute(&self, ctx: &NodeContext) -> Result<ExecutorResponse, ExecutorError> {
        tracing::debug!(flow_id = %ctx.flow_id, executor = %self.name, "Executing OAuth executor");

        if self.check_input_data(ctx) {
            return self.build_authorize_flow(ctx).await;
        }
        self.process_auth_flow_response(ctx).await
    }
}

/// Applies the client/server rule to a capability result.
///
/// Client errors fail the step with the provider's description. Server
/// errors are logged with their detail and surface as a fatal error carrying
/// only `fatal_message`.
pub(crate) fn classify<T>(
    ctx: &NodeContext,
    result: Result<T, ServiceError>,
    fatal_message: &'static str,
) -> Result<Outcome<T>, ExecutorError> {
    match result {
        Ok(value) => Ok(Outcome::Proceed(value)),
        Err(e) if e.is_client_error() => {
            tracing::debug!(
                flow_id = %ctx.flow_id,
                error_code = %e.code,
                "Identity provider rejected the request: {}",
                e.description
            );
            Ok(Outcome::Fail(e.description))
        }
        Err(e) => {
            tracing::error!(
                flow_id = %ctx.flow_id,
                error_code = %e.code,
                "{}: {}",
                fatal_message,
                e.description
            );
            Err(ExecutorError::internal(fatal_message))
        }
    }
}

/// Returns the non-empty string `sub` claim.
pub(crate) fn claim_subject(claims: &Claims) -> Option<String> {
    claims
        .get("sub")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
