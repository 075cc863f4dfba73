pub(crate) mod health_check_controller;
pub(crate) mod oauth_controller;
pub(crate) mod page_controller;
pub(crate) mod token_controller;
