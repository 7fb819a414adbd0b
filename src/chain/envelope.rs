//! Transaction payload and envelope encoding.
//!
//! The signer signs `DOMAIN_TAG || rlp(envelope)` where
//!
//! ```text
//! payload  = [script, [args..], reference_block_id, gas_limit,
//!             proposer_address, proposer_key_index, proposer_sequence,
//!             payer, [authorizers..]]
//! envelope = [payload, [payload_signatures..]]
//! ```
//!
//! The service account is proposer, payer and sole authorizer, so only an
//! envelope signature is produced and the payload signature list is empty.

use alloy_rlp::{Encodable, Header};

use crate::chain::types::{Address, ChainError, ChainResult};

/// Transaction domain tag, right padded with zeros to 32 bytes.
pub fn domain_tag() -> [u8; 32] {
    let mut tag = [0u8; 32];
    let raw = b"FLOW-V0.0-transaction";
    tag[..raw.len()].copy_from_slice(raw);
    tag
}

/// Key selected to propose a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposalKey {
    pub address: Address,
    pub key_index: u32,
    pub sequence_number: u64,
}

/// A transaction ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub script: String,
    pub arguments: Vec<Vec<u8>>,
    pub reference_block_id: String,
    pub gas_limit: u64,
    pub proposal_key: ProposalKey,
    pub payer: Address,
    pub authorizers: Vec<Address>,
}

/// Signature over the envelope by one account key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeSignature {
    pub address: Address,
    pub key_index: u32,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub transaction: UnsignedTransaction,
    pub envelope_signatures: Vec<EnvelopeSignature>,
}

impl UnsignedTransaction {
    fn reference_block_bytes(&self) -> ChainResult<Vec<u8>> {
        let raw = self.reference_block_id.strip_prefix("0x").unwrap_or(&self.reference_block_id);
        hex::decode(raw).map_err(|e| ChainError::Decode(format!("reference block id: {}", e)))
    }

    /// RLP encoding of the payload list.
    pub fn payload_rlp(&self) -> ChainResult<Vec<u8>> {
        let arguments: Vec<Vec<u8>> = self.arguments.iter().map(|a| rlp_bytes(a)).collect();
        let authorizers: Vec<Vec<u8>> =
            self.authorizers.iter().map(|a| rlp_bytes(a.as_bytes())).collect();

        Ok(rlp_list(&[
            rlp_bytes(self.script.as_bytes()),
            rlp_list(&arguments),
            rlp_bytes(&self.reference_block_bytes()?),
            rlp_uint(self.gas_limit),
            rlp_bytes(self.proposal_key.address.as_bytes()),
            rlp_uint(u64::from(self.proposal_key.key_index)),
            rlp_uint(self.proposal_key.sequence_number),
            rlp_bytes(self.payer.as_bytes()),
            rlp_list(&authorizers),
        ]))
    }

    /// Bytes the envelope signer signs.
    pub fn envelope_message(&self) -> ChainResult<Vec<u8>> {
        let envelope = rlp_list(&[self.payload_rlp()?, rlp_list(&[])]);
        let mut message = domain_tag().to_vec();
        message.extend_from_slice(&envelope);
        Ok(message)
    }
}

fn rlp_bytes(b: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(b.len() + 9);
    Encodable::encode(b, &mut out);
    out
}

fn rlp_uint(v: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    Encodable::encode(&v, &mut out);
    out
}

/// Wrap already-encoded items in a list header.
fn rlp_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload_length: usize = items.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(payload_length + 9);
    Header { list: true, payload_length }.encode(&mut out);
    for item in items {
        out.extend_from_slice(item);
    }
    out
}
