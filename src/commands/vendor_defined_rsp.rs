// Licensed under the Apache-2.0 license

use crate::codec::{write_u16, Codec, CommonCodec, MessageBuf, MessageReader};
use crate::commands::error_rsp::ErrorCode;
use crate::config::{MAX_VENDOR_ID_LEN, MAX_VENDOR_PAYLOAD_SIZE};
use crate::context::SpdmContext;
use crate::error::{CommandError, CommandResult};
use crate::protocol::{ReqRespCode, SpdmMsgHdr};
use crate::session::SessionState;
use crate::state::ConnectionState;
use crate::vdm::VdmError;
use zerocopy::{FromBytes, Immutable, IntoBytes};

#[derive(FromBytes, IntoBytes, Immutable)]
#[repr(C, packed)]
struct VendorDefinedReqHdr {
    param1: u8,
    param2: u8,
    standard_id: u16,
    vendor_id_len: u8,
}

impl CommonCodec for VendorDefinedReqHdr {}

pub(crate) fn handle_vendor_defined(
    ctx: &mut SpdmContext,
    spdm_hdr: SpdmMsgHdr,
    req: &[u8],
    rsp_buf: &mut MessageBuf,
    session_id: Option<u32>,
) -> CommandResult<()> {
    let connection_version = ctx.state.connection_info.version_number();
    if spdm_hdr.version().ok() != Some(connection_version) {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::VersionMismatch, 0, None))?;
    }

    ctx.response_state_gate(ReqRespCode::VendorDefinedRequest, spdm_hdr.raw_code(), rsp_buf)?;

    if ctx.state.connection_info.state() < ConnectionState::AlgorithmsNegotiated {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?;
    }

    if let Some(session_id) = session_id {
        match ctx.session_mgr.session_info(session_id) {
            Ok(info) if info.session_state == SessionState::Established => {}
            _ => Err(ctx.generate_error_response(rsp_buf, ErrorCode::UnexpectedRequest, 0, None))?,
        }
    }

    let mut reader = MessageReader::new(&req[2..]);
    if reader.remaining() < core::mem::size_of::<VendorDefinedReqHdr>() {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }
    let req_hdr =
        VendorDefinedReqHdr::decode(&mut reader).map_err(|e| (false, CommandError::Codec(e)))?;

    let vendor_id_len = req_hdr.vendor_id_len as usize;
    if vendor_id_len > MAX_VENDOR_ID_LEN || reader.remaining() < vendor_id_len + 2 {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }
    let vendor_id = reader
        .take(vendor_id_len)
        .map_err(|e| (false, CommandError::Codec(e)))?;
    let req_len = reader.read_u16().map_err(|e| (false, CommandError::Codec(e)))?;
    if reader.remaining() != req_len as usize {
        Err(ctx.generate_error_response(rsp_buf, ErrorCode::InvalidRequest, 0, None))?;
    }
    let payload = reader
        .take(req_len as usize)
        .map_err(|e| (false, CommandError::Codec(e)))?;

    ctx.reset_transcripts_via_request_code(ReqRespCode::VendorDefinedRequest);

    let standard_id = req_hdr.standard_id;
    let mut vendor_rsp = [0u8; MAX_VENDOR_PAYLOAD_SIZE];
    let handled = match ctx.vdm_responder.as_mut() {
        Some(responder)
            if responder.standard_id() == standard_id && responder.vendor_id() == vendor_id =>
        {
            responder.handle_request(payload, &mut vendor_rsp)
        }
        _ => Err(VdmError::UnsupportedProtocol),
    };

    let rsp_payload_len = match handled {
        Ok(len) if len <= MAX_VENDOR_PAYLOAD_SIZE => len,
        Ok(_) | Err(VdmError::ResponseTooLarge) => Err(ctx.generate_error_response(
            rsp_buf,
            ErrorCode::ResponseTooLarge,
            0,
            None,
        ))?,
        Err(VdmError::UnsupportedProtocol) => Err(ctx.generate_error_response(
            rsp_buf,
            ErrorCode::UnsupportedRequest,
            spdm_hdr.raw_code(),
            None,
        ))?,
        Err(VdmError::HandlerFailure) => {
            Err(ctx.generate_error_response(rsp_buf, ErrorCode::Unspecified, 0, None))?
        }
    };

    let spdm_resp_hdr = SpdmMsgHdr::new(connection_version, ReqRespCode::VendorDefinedResponse);
    spdm_resp_hdr
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;

    let rsp_hdr = VendorDefinedReqHdr {
        param1: 0,
        param2: 0,
        standard_id,
        vendor_id_len: req_hdr.vendor_id_len,
    };
    rsp_hdr
        .encode(rsp_buf)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;

    rsp_buf
        .put_data(vendor_id_len)
        .map_err(|_| (false, CommandError::BufferTooSmall))?
        .copy_from_slice(vendor_id);

    let rsp_len_field = rsp_buf
        .put_data(2)
        .map_err(|_| (false, CommandError::BufferTooSmall))?;
    write_u16(rsp_len_field, rsp_payload_len as u16);

    rsp_buf
        .put_data(rsp_payload_len)
        .map_err(|_| (false, CommandError::BufferTooSmall))?
        .copy_from_slice(&vendor_rsp[..rsp_payload_len]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SpdmContext;
    use crate::testutil::*;
    use crate::vdm::{VdmResponder, VdmResult};

    const TEST_STANDARD_ID: u16 = 0x8086;
    const TEST_VENDOR_ID: [u8; 2] = [0xAB, 0xCD];

    struct EchoVdm;

    impl VdmResponder for EchoVdm {
        fn standard_id(&self) -> u16 {
            TEST_STANDARD_ID
        }

        fn vendor_id(&self) -> &[u8] {
            &TEST_VENDOR_ID
        }

        fn handle_request(&mut self, req: &[u8], rsp: &mut [u8]) -> VdmResult<usize> {
            rsp[..req.len()].copy_from_slice(req);
            rsp[..req.len()].reverse();
            Ok(req.len())
        }
    }

    fn vendor_request(standard_id: u16, vendor_id: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut req = vec![0x12, 0xFE, 0x00, 0x00];
        req.extend_from_slice(&standard_id.to_le_bytes());
        req.push(vendor_id.len() as u8);
        req.extend_from_slice(vendor_id);
        req.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        req.extend_from_slice(payload);
        req
    }

    #[test]
    fn test_vendor_request_round_trips_through_handler() {
        let mut crypto = MockCryptoProvider::new();
        let mut echo = EchoVdm;
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        ctx.set_vdm_responder(&mut echo);
        negotiate(&mut ctx);

        let mut rsp = [0u8; 256];
        let req = vendor_request(TEST_STANDARD_ID, &TEST_VENDOR_ID, &[1, 2, 3, 4]);
        let len = ctx.handle_request(&req, &mut rsp).unwrap();

        assert_eq!(rsp[1], 0x7E);
        assert_eq!(&rsp[4..6], &TEST_STANDARD_ID.to_le_bytes());
        assert_eq!(rsp[6], 2);
        assert_eq!(&rsp[7..9], &TEST_VENDOR_ID);
        assert_eq!(&rsp[9..11], &4u16.to_le_bytes());
        assert_eq!(&rsp[11..len], &[4, 3, 2, 1]);
    }

    #[test]
    fn test_vendor_mismatch_is_unsupported() {
        let mut crypto = MockCryptoProvider::new();
        let mut echo = EchoVdm;
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        ctx.set_vdm_responder(&mut echo);
        negotiate(&mut ctx);

        let mut rsp = [0u8; 256];
        let req = vendor_request(0x1111, &TEST_VENDOR_ID, &[1]);
        ctx.handle_request(&req, &mut rsp).unwrap();
        assert_eq!(rsp[2], u8::from(ErrorCode::UnsupportedRequest));
        assert_eq!(rsp[3], 0xFE);
    }

    #[test]
    fn test_vendor_without_handler_is_unsupported() {
        let mut crypto = MockCryptoProvider::new();
        let mut ctx = SpdmContext::new(
            TEST_VERSIONS,
            test_local_capabilities(),
            test_local_algorithms(),
            &mut crypto,
        )
        .unwrap();
        negotiate(&mut ctx);

        let mut rsp = [0u8; 256];
        let req = vendor_request(TEST_STANDARD_ID, &TEST_VENDOR_ID, &[]);
        ctx.handle_request(&req, &mut rsp).unwrap();
        assert_eq!(rsp[2], u8::from(ErrorCode::UnsupportedRequest));
    }
}
