use crate::error::{ClientError, ImportError};
use crate::mapper::Mapper;
use crate::model::{NewProvider, NewToken, Provider, Token};
use crate::provider::{BackendClient, ClientResult};
use crate::request::ImportRequest;
use tracing::{debug, error, warn};

/// Provider name the backend stores for GitLab instances.
pub const PROVIDER_NAME: &str = "gitlab";

/// Token and provider an import runs under.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Credentials {
    pub token: Token,
    pub provider: Provider,
}

impl Credentials {
    pub fn mapper(&self) -> Mapper {
        Mapper::new(self.token.token_id, self.provider.provider_id)
    }
}

/// Resolves the token, then the provider bound to it.
pub fn obtain_credentials(
    backend: &dyn BackendClient,
    request: &ImportRequest,
) -> Result<Credentials, ImportError> {
    let token = obtain_token(backend, request).map_err(ImportError::Backend)?;
    let provider =
        obtain_provider(backend, token.token_id, request).map_err(ImportError::Backend)?;
    Ok(Credentials { token, provider })
}

/// Gets the token by id when one is given; otherwise finds it by its value or creates it.
pub fn obtain_token(backend: &dyn BackendClient, request: &ImportRequest) -> ClientResult<Token> {
    if request.token_id != 0 {
        return backend
            .get_token_by_id(request.token_id)
            .inspect_err(|err| error!(error = %err, token_id = request.token_id, "unable to get token"));
    }

    match find_token_by_token_string(backend, &request.token) {
        Ok(Some(token)) => return Ok(token),
        Ok(None) => {}
        Err(err) if err.is_unauthorized() => return Err(err),
        Err(err) => warn!(error = %err, "unable to search tokens, creating one"),
    }

    let token = backend
        .create_token(&NewToken {
            token: request.token.clone(),
            user_name: request.user.clone(),
        })
        .inspect_err(|err| error!(error = %err, "unable to post token"))?;
    debug!(token_id = token.token_id, "created token");
    Ok(token)
}

/// Gets the provider by id when one is given; otherwise finds the GitLab
/// provider for the request URL or creates it bound to `token_id`.
pub fn obtain_provider(
    backend: &dyn BackendClient,
    token_id: u64,
    request: &ImportRequest,
) -> ClientResult<Provider> {
    if request.provider_id != 0 {
        return backend.get_provider_by_id(request.provider_id).inspect_err(
            |err| error!(error = %err, provider_id = request.provider_id, "unable to get provider"),
        );
    }

    match find_provider_by_name_and_url(backend, PROVIDER_NAME, &request.url) {
        Ok(Some(provider)) => {
            debug!(provider_id = provider.provider_id, "provider from backend");
            return Ok(provider);
        }
        Ok(None) => {}
        Err(err) if err.is_unauthorized() => return Err(err),
        Err(err) => warn!(error = %err, "unable to search providers, creating one"),
    }

    let provider = backend
        .create_provider(&NewProvider {
            name: PROVIDER_NAME.to_string(),
            url: request.url.clone(),
            token_id,
        })
        .inspect_err(|err| error!(error = %err, "unable to post provider"))?;
    debug!(provider_id = provider.provider_id, "created provider");
    Ok(provider)
}

pub fn find_token_by_token_string(
    backend: &dyn BackendClient,
    token: &str,
) -> Result<Option<Token>, ClientError> {
    Ok(backend
        .list_tokens()?
        .into_iter()
        .find(|candidate| candidate.token == token))
}

/// URL comparison ignores a trailing slash.
pub fn find_provider_by_name_and_url(
    backend: &dyn BackendClient,
    name: &str,
    url: &str,
) -> Result<Option<Provider>, ClientError> {
    let url = url.trim_end_matches('/');
    Ok(backend.list_providers()?.into_iter().find(|candidate| {
        candidate.name == name && candidate.url.trim_end_matches('/') == url
    }))
}
