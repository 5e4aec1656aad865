use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::put_object::PutObjectError;
use aws_sdk_s3::primitives::ByteStream;
use catalog_core::contract::ArtifactLocation;
use catalog_core::error::{UploadError, UploadFailureKind};

const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Service error codes that indicate a temporary condition on the store side.
const TRANSIENT_ERROR_CODES: [&str; 6] = [
    "SlowDown",
    "RequestTimeout",
    "InternalError",
    "ServiceUnavailable",
    "Throttling",
    "ThrottlingException",
];

/// Write-once object storage. Implementations never retry; retry policy
/// belongs to the caller.
pub trait ContentStore {
    fn upload(&self, container: &str, key: &str, body: &[u8])
        -> Result<ArtifactLocation, UploadError>;
}

pub struct S3ContentStore {
    s3_client: aws_sdk_s3::Client,
}

impl S3ContentStore {
    /// The client should be built with SDK retries disabled.
    pub fn new(s3_client: aws_sdk_s3::Client) -> Self {
        Self { s3_client }
    }
}

impl ContentStore for S3ContentStore {
    fn upload(
        &self,
        container: &str,
        key: &str,
        body: &[u8],
    ) -> Result<ArtifactLocation, UploadError> {
        let bucket = container.to_string();
        let object_key = key.to_string();
        let body_bytes = body.to_vec();
        let client = self.s3_client.clone();

        let version = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .put_object()
                    .bucket(bucket)
                    .key(object_key)
                    .content_type(ARCHIVE_CONTENT_TYPE)
                    .body(ByteStream::from(body_bytes))
                    .send()
                    .await
                    .map(|output| output.version_id().map(str::to_string))
                    .map_err(|error| put_object_error(&error))
            })
        })?;

        Ok(ArtifactLocation::new(container, key).with_version(version))
    }
}

fn put_object_error(error: &SdkError<PutObjectError>) -> UploadError {
    let transport = matches!(
        error,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_)
    );
    let status = error
        .raw_response()
        .map(|response| response.status().as_u16());
    let message = format!("failed to write object to s3: {}", DisplayErrorContext(error));

    match classify_failure(transport, status, error.code()) {
        UploadFailureKind::Transient => UploadError::transient(message),
        UploadFailureKind::Rejected => UploadError::rejected(message),
    }
}

/// Decides whether a failed upload may be retried by the caller.
pub fn classify_failure(
    transport: bool,
    status: Option<u16>,
    code: Option<&str>,
) -> UploadFailureKind {
    if transport {
        return UploadFailureKind::Transient;
    }
    if code.is_some_and(|code| TRANSIENT_ERROR_CODES.contains(&code)) {
        return UploadFailureKind::Transient;
    }
    match status {
        Some(408 | 429) => UploadFailureKind::Transient,
        Some(status) if status >= 500 => UploadFailureKind::Transient,
        _ => UploadFailureKind::Rejected,
    }
}
