//! WebSocket support: framing, handshake, permessage-deflate, and
//! fragmentation reassembly (§4.7).

pub mod close;
pub mod deflate;
pub mod frame;
pub mod handshake;

use breakwater_common::ProtocolError;
use close::CloseCode;
use deflate::{DeflateParams, Decoder, Encoder};
use frame::{Frame, Opcode};

/// Per-direction permessage-deflate codec state, held only when the
/// extension was negotiated for this connection.
struct DeflateContext {
    encoder: Encoder,
    decoder: Decoder,
}

impl DeflateContext {
    /// `mask_outgoing` tells us which role this session plays: a client
    /// masks its own outgoing frames, so its outgoing direction is governed
    /// by `client_*` params and its incoming direction by the peer's
    /// (server) params, and vice versa for a server-role session.
    fn new(params: DeflateParams, mask_outgoing: bool) -> Self {
        let (encoder_no_takeover, encoder_bits, decoder_no_takeover, decoder_bits) = if mask_outgoing {
            (
                params.client_no_context_takeover,
                params.client_max_window_bits,
                params.server_no_context_takeover,
                params.server_max_window_bits,
            )
        } else {
            (
                params.server_no_context_takeover,
                params.server_max_window_bits,
                params.client_no_context_takeover,
                params.client_max_window_bits,
            )
        };
        DeflateContext {
            encoder: Encoder::new(encoder_bits, encoder_no_takeover),
            decoder: Decoder::new(decoder_bits, decoder_no_takeover),
        }
    }
}

/// Outcome of feeding one complete frame through [`Session::process_frame`].
#[derive(Debug)]
pub enum FrameOutcome {
    /// A complete text/binary message is ready for the application.
    Message { binary: bool, data: Vec<u8> },
    /// A control frame was handled internally; `reply` is the frame to
    /// write back, if any (pong for ping, echo for close).
    Handled { reply: Option<Vec<u8>> },
    /// The peer asked to close, or a protocol violation forces a close;
    /// `reply` is the close frame to send before tearing down the socket.
    Close { code: u16, reply: Vec<u8> },
}

/// Reassembles fragmented messages and applies permessage-deflate, sitting
/// between the raw frame codec and the application callback (§4.7, §4.10).
pub struct Session {
    deflate: Option<DeflateContext>,
    fragment_opcode: Option<Opcode>,
    fragment_rsv1: bool,
    fragment_buf: Vec<u8>,
    mask_outgoing: bool,
}

impl Session {
    /// `deflate` is `Some` when permessage-deflate was negotiated during the
    /// handshake; `mask_outgoing` is `true` for a client-role session (masks
    /// its own outgoing frames, expects unmasked incoming ones) and `false`
    /// for a server-role session (RFC 6455 §5.1).
    pub fn new(deflate: Option<DeflateParams>, mask_outgoing: bool) -> Self {
        Session {
            deflate: deflate.map(|params| DeflateContext::new(params, mask_outgoing)),
            fragment_opcode: None,
            fragment_rsv1: false,
            fragment_buf: Vec::new(),
            mask_outgoing,
        }
    }

    /// Parse and react to one complete frame already read off the wire.
    pub fn process_frame(&mut self, frame: Frame) -> Result<FrameOutcome, ProtocolError> {
        // RFC 6455 §5.1: frames arriving at a server-role session MUST be
        // masked; frames arriving at a client-role session MUST NOT be.
        if frame.masked == self.mask_outgoing {
            return Err(ProtocolError::WsMaskMissing);
        }
        match frame.opcode {
            Opcode::Ping => {
                let reply = frame::write_frame(Opcode::Pong, &frame.payload, true, false, self.mask_key());
                Ok(FrameOutcome::Handled { reply: Some(reply) })
            }
            Opcode::Pong => Ok(FrameOutcome::Handled { reply: None }),
            Opcode::Close => {
                let (code, _) = close::parse_close_payload(&frame.payload);
                let echo = close::build_close_payload(code, "");
                let reply = frame::write_frame(Opcode::Close, &echo, true, false, self.mask_key());
                Ok(FrameOutcome::Close { code, reply })
            }
            Opcode::Text | Opcode::Binary => self.handle_data_frame(frame),
            Opcode::Continuation => self.handle_continuation(frame),
        }
    }

    fn mask_key(&self) -> Option<[u8; 4]> {
        if self.mask_outgoing {
            use rand::RngCore;
            let mut key = [0u8; 4];
            rand::rng().fill_bytes(&mut key);
            Some(key)
        } else {
            None
        }
    }

    fn handle_data_frame(&mut self, frame: Frame) -> Result<FrameOutcome, ProtocolError> {
        let binary = frame.opcode == Opcode::Binary;
        if frame.fin {
            let data = self.finish_payload(frame.rsv1, frame.payload, binary)?;
            Ok(FrameOutcome::Message { binary, data })
        } else {
            self.fragment_opcode = Some(frame.opcode);
            self.fragment_rsv1 = frame.rsv1;
            self.fragment_buf = frame.payload;
            Ok(FrameOutcome::Handled { reply: None })
        }
    }

    fn handle_continuation(&mut self, frame: Frame) -> Result<FrameOutcome, ProtocolError> {
        let Some(opcode) = self.fragment_opcode else {
            return Err(ProtocolError::WsFragmentOrder);
        };
        self.fragment_buf.extend_from_slice(&frame.payload);
        if frame.fin {
            let binary = opcode == Opcode::Binary;
            let rsv1 = self.fragment_rsv1;
            let data = std::mem::take(&mut self.fragment_buf);
            self.fragment_opcode = None;
            let data = self.finish_payload(rsv1, data, binary)?;
            Ok(FrameOutcome::Message { binary, data })
        } else {
            Ok(FrameOutcome::Handled { reply: None })
        }
    }

    fn finish_payload(&mut self, rsv1: bool, payload: Vec<u8>, binary: bool) -> Result<Vec<u8>, ProtocolError> {
        let data = if rsv1 {
            let Some(ctx) = &mut self.deflate else {
                return Err(ProtocolError::WsRsvViolation);
            };
            ctx.decoder
                .decompress(&payload)
                .map_err(|e| ProtocolError::WsDecompressionFailed(e.to_string()))?
        } else {
            payload
        };
        if !binary && !close::validate_text_payload(&data) {
            return Err(ProtocolError::WsUtf8Invalid);
        }
        Ok(data)
    }

    /// Build an outbound data frame, compressing it with permessage-deflate
    /// when negotiated. With context takeover the compressed form is always
    /// sent (see [`Encoder::compress`]); without it, only when smaller.
    pub fn build_message_frame(&mut self, binary: bool, data: &[u8]) -> Vec<u8> {
        let opcode = if binary { Opcode::Binary } else { Opcode::Text };
        let mask_key = self.mask_key();
        if let Some(ctx) = &mut self.deflate {
            if let Some(compressed) = ctx.encoder.compress(data) {
                return frame::write_frame(opcode, &compressed, true, true, mask_key);
            }
        }
        frame::write_frame(opcode, data, true, false, mask_key)
    }

    pub fn build_close_frame(&self, code: u16, reason: &str) -> Vec<u8> {
        let payload = close::build_close_payload(code, reason);
        frame::write_frame(Opcode::Close, &payload, true, false, self.mask_key())
    }
}

pub fn close_code_for_protocol_error(err: &ProtocolError) -> u16 {
    match err {
        ProtocolError::WsUtf8Invalid | ProtocolError::WsDecompressionFailed(_) => CloseCode::INVALID_DATA,
        ProtocolError::WsControlOversized => CloseCode::MESSAGE_TOO_BIG,
        _ => CloseCode::PROTOCOL_ERROR,
    }
}
