pub(crate) mod flow_session;

use axum::http::StatusCode;

type RejectionType = (StatusCode, String);
