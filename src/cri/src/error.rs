//! CRI-specific error conversions.

use podshim_core::ShimError;
use tonic::Status;

/// Convert a ShimError to a gRPC Status.
pub fn shim_error_to_status(err: ShimError) -> Status {
    match err {
        ShimError::ConnectionError(msg) => Status::unavailable(msg),
        ShimError::ValidationError(msg) => Status::invalid_argument(msg),
        ShimError::ConfigError(msg) => Status::invalid_argument(msg),
        ShimError::UnknownHandle(msg) => Status::not_found(msg),
        err @ ShimError::EngineError { .. } => Status::internal(err.to_string()),
        ShimError::IoError(e) => Status::internal(e.to_string()),
    }
}

/// Convert a gRPC Status received by a client back into a ShimError.
pub fn status_to_shim_error(status: Status) -> ShimError {
    let message = status.message().to_string();
    match status.code() {
        tonic::Code::Unavailable => ShimError::ConnectionError(message),
        tonic::Code::InvalidArgument => ShimError::ValidationError(message),
        tonic::Code::NotFound => ShimError::UnknownHandle(message),
        _ => ShimError::EngineError {
            context: "rpc".to_string(),
            message,
        },
    }
}
