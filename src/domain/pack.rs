//! Pack entity: sealed contents, commitment and the reveal/open lifecycle.
//!
//! # States
//! ```text
//! Init → Sealed → RevealRequested → Revealed → OpenRequested → Opened → Empty
//!                                 ╰── (open requested with reveal) ──╯
//! ```
//! Each `*Requested` state records that the unsealing transaction has been
//! queued, so re-delivered request events do not queue it twice.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

use crate::domain::collectible::{Collectible, FlowId};
use crate::domain::error::{TemplateError, TransitionError};
use crate::error::PdsResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackState {
    Init,
    Sealed,
    RevealRequested,
    Revealed,
    OpenRequested,
    Opened,
    Empty,
}

impl PackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Sealed => "sealed",
            Self::RevealRequested => "reveal_requested",
            Self::Revealed => "revealed",
            Self::OpenRequested => "open_requested",
            Self::Opened => "opened",
            Self::Empty => "empty",
        }
    }
}

impl fmt::Display for PackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pack {
    pub id: Uuid,
    pub distribution_id: Uuid,
    /// Pack token id, assigned once the mint is observed on chain.
    pub flow_id: Option<FlowId>,
    pub state: PackState,
    /// Hex-encoded 32 byte salt.
    pub salt: Option<String>,
    /// Hex-encoded SHA2-256 commitment.
    pub commitment_hash: Option<String>,
    pub collectibles: Vec<Collectible>,
    /// Holder asked to open together with the reveal.
    #[serde(default)]
    pub open_on_reveal: bool,
}

impl Pack {
    pub fn new(distribution_id: Uuid, collectibles: Vec<Collectible>) -> Self {
        Self {
            id: Uuid::new_v4(),
            distribution_id,
            flow_id: None,
            state: PackState::Init,
            salt: None,
            commitment_hash: None,
            collectibles,
            open_on_reveal: false,
        }
    }

    /// Validate contents, draw a salt and compute the commitment.
    pub fn seal<R: RngCore + ?Sized>(&mut self, rng: &mut R) -> PdsResult<()> {
        self.guard(PackState::Init, "seal")?;
        if self.collectibles.is_empty() {
            return Err(TemplateError::EmptyPack.into());
        }
        if let Some(slot) = self.collectibles.iter().position(Collectible::is_zero) {
            return Err(TemplateError::UnpopulatedSlot { slot }.into());
        }

        let mut salt = [0u8; 32];
        rng.fill_bytes(&mut salt);
        let salt = hex::encode(salt);
        self.commitment_hash = Some(commitment(&salt, &self.collectibles));
        self.salt = Some(salt);
        self.state = PackState::Sealed;
        Ok(())
    }

    /// Whether the stored commitment matches the contents and salt.
    pub fn verify_commitment(&self) -> bool {
        match (&self.salt, &self.commitment_hash) {
            (Some(salt), Some(hash)) => commitment(salt, &self.collectibles) == *hash,
            _ => false,
        }
    }

    /// Record the token id observed in the mint event.
    pub fn set_flow_id(&mut self, flow_id: FlowId) -> Result<(), TransitionError> {
        self.guard(PackState::Sealed, "assign a token id to")?;
        if self.flow_id.is_some() {
            return Err(TransitionError::new("pack", "assign a token id to", "minted"));
        }
        self.flow_id = Some(flow_id);
        Ok(())
    }

    pub fn acknowledge_reveal_request(&mut self, open_request: bool) -> Result<(), TransitionError> {
        self.guard(PackState::Sealed, "acknowledge a reveal request for")?;
        if self.flow_id.is_none() {
            return Err(TransitionError::new("pack", "acknowledge a reveal request for", "unminted"));
        }
        self.state = PackState::RevealRequested;
        self.open_on_reveal = open_request;
        Ok(())
    }

    /// Confirm the on-chain reveal. A pack whose open was requested together
    /// with the reveal moves straight to `OpenRequested`.
    pub fn reveal(&mut self) -> Result<(), TransitionError> {
        self.guard(PackState::RevealRequested, "reveal")?;
        self.state = if self.open_on_reveal {
            PackState::OpenRequested
        } else {
            PackState::Revealed
        };
        Ok(())
    }

    pub fn acknowledge_open_request(&mut self) -> Result<(), TransitionError> {
        self.guard(PackState::Revealed, "acknowledge an open request for")?;
        self.state = PackState::OpenRequested;
        Ok(())
    }

    pub fn open(&mut self) -> Result<(), TransitionError> {
        self.guard(PackState::OpenRequested, "open")?;
        self.state = PackState::Opened;
        Ok(())
    }

    /// Contents have been withdrawn to the holder.
    pub fn empty(&mut self) -> Result<(), TransitionError> {
        self.guard(PackState::Opened, "empty")?;
        self.state = PackState::Empty;
        Ok(())
    }

    fn guard(&self, expected: PackState, action: &'static str) -> Result<(), TransitionError> {
        if self.state != expected {
            return Err(TransitionError::new("pack", action, self.state));
        }
        Ok(())
    }
}

/// SHA2-256 over `salt,<collectible>,<collectible>,...` in slot order.
pub fn commitment(salt: &str, collectibles: &[Collectible]) -> String {
    let mut input = salt.to_string();
    for c in collectibles {
        input.push(',');
        input.push_str(&c.to_string());
    }
    hex::encode(Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::template::tests::contract;
    use crate::error::PdsError;

    fn sealed_pack() -> Pack {
        let nft = contract("ExampleNFT");
        let mut pack = Pack::new(Uuid::new_v4(), vec![
            Collectible::new(nft.clone(), 7),
            Collectible::new(nft, 9),
        ]);
        pack.seal(&mut rand::thread_rng()).unwrap();
        pack
    }

    #[test]
    fn test_seal_sets_salt_and_commitment() {
        let pack = sealed_pack();
        assert_eq!(pack.state, PackState::Sealed);
        let salt = pack.salt.as_deref().unwrap();
        assert_eq!(salt.len(), 64);
        assert_ne!(salt, "0".repeat(64));
        assert_eq!(pack.commitment_hash.as_deref().unwrap().len(), 64);
        assert!(pack.verify_commitment());
    }

    #[test]
    fn test_commitment_binds_order_and_salt() {
        let nft = contract("ExampleNFT");
        let a = Collectible::new(nft.clone(), 1);
        let b = Collectible::new(nft, 2);
        let forward = commitment("aa", &[a.clone(), b.clone()]);
        assert_ne!(forward, commitment("aa", &[b, a.clone()]));
        assert_ne!(forward, commitment("bb", &[a.clone(), Collectible::new(a.contract.clone(), 2)]));
        assert_eq!(forward, commitment("aa", &[a.clone(), Collectible::new(a.contract, 2)]));
    }

    #[test]
    fn test_seal_rejects_zero_collectible() {
        let nft = contract("ExampleNFT");
        let mut pack = Pack::new(Uuid::new_v4(), vec![
            Collectible::new(nft.clone(), 3),
            Collectible::new(nft, 0),
        ]);
        let err = pack.seal(&mut rand::thread_rng()).unwrap_err();
        assert!(matches!(err, PdsError::Template(TemplateError::UnpopulatedSlot { slot: 1 })));
        assert_eq!(pack.state, PackState::Init);
        assert!(pack.salt.is_none());
    }

    #[test]
    fn test_seal_rejects_empty_pack() {
        let mut pack = Pack::new(Uuid::new_v4(), vec![]);
        assert!(matches!(
            pack.seal(&mut rand::thread_rng()),
            Err(PdsError::Template(TemplateError::EmptyPack))
        ));
    }

    #[test]
    fn test_seal_twice_is_a_state_guard() {
        let mut pack = sealed_pack();
        assert!(pack.seal(&mut rand::thread_rng()).unwrap_err().is_state_guard());
    }

    #[test]
    fn test_flow_id_assigned_once() {
        let mut pack = sealed_pack();
        pack.set_flow_id(11).unwrap();
        assert!(pack.set_flow_id(12).is_err());
        assert_eq!(pack.flow_id, Some(11));
    }

    #[test]
    fn test_reveal_then_open() {
        let mut pack = sealed_pack();
        assert!(pack.acknowledge_reveal_request(false).is_err(), "unminted pack");
        pack.set_flow_id(1).unwrap();

        pack.acknowledge_reveal_request(false).unwrap();
        assert!(pack.acknowledge_reveal_request(false).is_err());
        pack.reveal().unwrap();
        assert_eq!(pack.state, PackState::Revealed);

        pack.acknowledge_open_request().unwrap();
        pack.open().unwrap();
        pack.empty().unwrap();
        assert_eq!(pack.state, PackState::Empty);
    }

    #[test]
    fn test_reveal_with_open_request_skips_revealed() {
        let mut pack = sealed_pack();
        pack.set_flow_id(1).unwrap();
        pack.acknowledge_reveal_request(true).unwrap();
        pack.reveal().unwrap();
        assert_eq!(pack.state, PackState::OpenRequested);
        assert!(pack.acknowledge_open_request().is_err());
        pack.open().unwrap();
    }

    #[test]
    fn test_open_requires_request() {
        let mut pack = sealed_pack();
        let err = pack.open().unwrap_err();
        assert_eq!(err.state, "sealed");
    }
}
