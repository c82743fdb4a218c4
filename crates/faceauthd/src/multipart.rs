use bytes::Bytes;
use futures::stream;
use multer::Multipart;

use crate::api::ApiError;

/// The multipart file field both endpoints read.
const IMAGE_FIELD: &str = "image";

/// Pull the `image` file field out of a multipart request body.
///
/// Any request shape without a readable `image` part — missing or
/// non-multipart content type, bad boundary, malformed body, or simply no
/// such field — reports as [`ApiError::NoImageUploaded`]: from the caller's
/// view there is no image either way.
pub async fn extract_image(content_type: Option<&str>, body: Bytes) -> Result<Bytes, ApiError> {
    let boundary = content_type
        .and_then(|ct| multer::parse_boundary(ct).ok())
        .ok_or(ApiError::NoImageUploaded)?;

    let body_stream = stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
    let mut multipart = Multipart::new(body_stream, boundary);

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(ApiError::NoImageUploaded),
            Err(e) => {
                tracing::debug!(error = %e, "multipart parsing failed");
                return Err(ApiError::NoImageUploaded);
            }
        };

        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let data = field.bytes().await.map_err(|e| {
            tracing::debug!(error = %e, "failed to read image field");
            ApiError::NoImageUploaded
        })?;
        return Ok(data);
    }
}
