//! Service account wallet and envelope signing.
//!
//! # Security
//! - Private keys are loaded ONLY from environment variables
//! - Keys are never logged or serialized

use alloy::primitives::B256;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use sha2::{Digest, Sha256};

use crate::chain::envelope::{EnvelopeSignature, SignedTransaction, UnsignedTransaction};
use crate::chain::types::{Address, ChainError, ChainResult};

/// Wallet for the custodial service account.
///
/// Every configured proposal key index on the account is registered with the
/// same secp256k1 key (ECDSA_secp256k1 / SHA2_256), so one signer covers all
/// key indexes used by rotation.
#[derive(Debug, Clone)]
pub struct Wallet {
    address: Address,
    signer: PrivateKeySigner,
}

impl Wallet {
    /// Create a wallet from a hex-encoded private key string.
    pub fn from_private_key(address: Address, private_key_hex: &str) -> ChainResult<Self> {
        let key_hex = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| ChainError::Wallet(format!("Invalid private key format: {}", e)))?;

        tracing::info!(address = %address, "Wallet initialized");

        Ok(Self { address, signer })
    }

    /// Load the private key from the named environment variable.
    pub fn from_env(address: Address, env_var: &str) -> ChainResult<Self> {
        let private_key = std::env::var(env_var).map_err(|_| {
            ChainError::Wallet(format!("Environment variable {} not set", env_var))
        })?;

        Self::from_private_key(address, &private_key)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign raw message bytes, returning the 64-byte `r || s` signature.
    pub fn sign(&self, message: &[u8]) -> ChainResult<Vec<u8>> {
        let digest = Sha256::digest(message);
        let hash = B256::from_slice(&digest);
        let signature = self
            .signer
            .sign_hash_sync(&hash)
            .map_err(|e| ChainError::Wallet(format!("Signing failed: {}", e)))?;
        Ok(signature.as_bytes()[..64].to_vec())
    }

    /// Sign the envelope of a transaction proposed, paid and authorized by
    /// this wallet's account.
    pub fn sign_envelope(&self, transaction: UnsignedTransaction) -> ChainResult<SignedTransaction> {
        let message = transaction.envelope_message()?;
        let signature = self.sign(&message)?;
        let key_index = transaction.proposal_key.key_index;
        Ok(SignedTransaction {
            transaction,
            envelope_signatures: vec![EnvelopeSignature {
                address: self.address,
                key_index,
                signature,
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::envelope::ProposalKey;

    // Well-known test private key (Anvil's first account)
    const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn address() -> Address {
        "0xf8d6e0586b0a20c7".parse().unwrap()
    }

    #[test]
    fn test_wallet_with_0x_prefix() {
        let wallet = Wallet::from_private_key(address(), &format!("0x{}", TEST_PRIVATE_KEY)).unwrap();
        assert_eq!(wallet.address(), address());
    }

    #[test]
    fn test_invalid_private_key() {
        let result = Wallet::from_private_key(address(), "invalid_key");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid private key"));
    }

    #[test]
    fn test_missing_env_var() {
        let result = Wallet::from_env(address(), "PDS_TEST_KEY_THAT_IS_NOT_SET");
        assert!(result.unwrap_err().to_string().contains("not set"));
    }

    #[test]
    fn test_signature_is_deterministic_and_64_bytes() {
        let wallet = Wallet::from_private_key(address(), TEST_PRIVATE_KEY).unwrap();
        let a = wallet.sign(b"hello").unwrap();
        let b = wallet.sign(b"hello").unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        assert_ne!(a, wallet.sign(b"world").unwrap());
    }

    #[test]
    fn test_sign_envelope_uses_proposal_key_index() {
        let wallet = Wallet::from_private_key(address(), TEST_PRIVATE_KEY).unwrap();
        let tx = UnsignedTransaction {
            script: "transaction {}".into(),
            arguments: vec![],
            reference_block_id: "00".repeat(32),
            gas_limit: 100,
            proposal_key: ProposalKey { address: address(), key_index: 3, sequence_number: 0 },
            payer: address(),
            authorizers: vec![address()],
        };
        let signed = wallet.sign_envelope(tx).unwrap();
        assert_eq!(signed.envelope_signatures.len(), 1);
        assert_eq!(signed.envelope_signatures[0].key_index, 3);
        assert_eq!(signed.envelope_signatures[0].address, address());
    }
}
