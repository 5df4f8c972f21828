pub mod auth_params_utils;
pub mod dlhd_page_utils;
pub mod key_line_utils;
pub mod signature_utils;
