use reqwest::{
    Response,
    header::{HeaderName, HeaderValue},
};

use crate::{
    error::{Error, Result},
    management::{AuthSession, request_context},
    tidal::catalog::check_status,
    types::{MediaKind, StreamDescriptor},
};

/// Opens the media URL of `descriptor` as an incremental byte source.
///
/// Presigned CDN URLs are fetched without credentials. When the descriptor
/// asks for a bearer token the request goes through the session instead, so
/// it benefits from the refresh-before-use policy.
pub async fn open(session: &AuthSession, descriptor: &StreamDescriptor) -> Result<Response> {
    let mut request = session.http().get(&descriptor.media_url);
    for (name, value) in &descriptor.auth_hint.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::UnsupportedManifest(format!("invalid header `{name}`: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::UnsupportedManifest(format!("invalid header value: {e}")))?;
        request = request.header(name, value);
    }

    let response = if descriptor.auth_hint.bearer {
        session.send(request).await?
    } else {
        request
            .send()
            .await
            .map_err(|e| Error::unavailable(request_context(&e), e))?
    };

    let response = check_status(response, MediaKind::Track, &descriptor.resource_id).await?;
    tracing::debug!(
        id = %descriptor.resource_id,
        length = ?response.content_length(),
        "media stream opened"
    );
    Ok(response)
}
