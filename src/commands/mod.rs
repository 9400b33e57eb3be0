// Licensed under the Apache-2.0 license

pub mod algorithms_rsp;
pub mod capabilities_rsp;
pub mod certificate_rsp;
pub mod challenge_auth_rsp;
pub mod digests_rsp;
pub mod end_session_rsp;
pub mod error_rsp;
pub mod finish_rsp;
pub mod heartbeat_rsp;
pub mod key_exchange_rsp;
pub mod key_update_rsp;
pub mod measurements_rsp;
pub mod psk_exchange_rsp;
pub mod psk_finish_rsp;
pub mod vendor_defined_rsp;
pub mod version_rsp;
