//! Typed views of the chain events the service consumes.

use crate::chain::cadence::EventFields;
use crate::chain::{Address, ChainEvent, ChainResult};
use crate::domain::FlowId;

pub const DEPOSIT: &str = "Deposit";
pub const MINT: &str = "Mint";

/// NonFungibleToken `Deposit(id: UInt64, to: Address?)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    pub id: FlowId,
    pub to: Option<Address>,
}

impl DepositEvent {
    pub fn decode(event: &ChainEvent) -> ChainResult<Self> {
        let fields = EventFields::parse(&event.payload)?;
        Ok(Self { id: fields.u64("id")?, to: fields.address("to")? })
    }
}

/// Pack contract `Mint(id: UInt64, commitHash: String)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintEvent {
    pub id: FlowId,
    pub commit_hash: String,
}

impl MintEvent {
    pub fn decode(event: &ChainEvent) -> ChainResult<Self> {
        let fields = EventFields::parse(&event.payload)?;
        Ok(Self { id: fields.u64("id")?, commit_hash: fields.string("commitHash")? })
    }
}

/// Holder-driven pack events, in the order they are processed per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackEventKind {
    RevealRequest,
    Revealed,
    OpenRequest,
    Opened,
}

impl PackEventKind {
    pub const ALL: [PackEventKind; 4] = [
        PackEventKind::RevealRequest,
        PackEventKind::Revealed,
        PackEventKind::OpenRequest,
        PackEventKind::Opened,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::RevealRequest => "RevealRequest",
            Self::Revealed => "Revealed",
            Self::OpenRequest => "OpenRequest",
            Self::Opened => "Opened",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackEvent {
    RevealRequest { id: FlowId, open_request: bool },
    Revealed { id: FlowId },
    OpenRequest { id: FlowId },
    Opened { id: FlowId },
}

impl PackEvent {
    pub fn decode(kind: PackEventKind, event: &ChainEvent) -> ChainResult<Self> {
        let fields = EventFields::parse(&event.payload)?;
        let id = fields.u64("id")?;
        Ok(match kind {
            PackEventKind::RevealRequest => PackEvent::RevealRequest {
                id,
                open_request: fields.bool("openRequest")?,
            },
            PackEventKind::Revealed => PackEvent::Revealed { id },
            PackEventKind::OpenRequest => PackEvent::OpenRequest { id },
            PackEventKind::Opened => PackEvent::Opened { id },
        })
    }

    pub fn pack_id(&self) -> FlowId {
        match self {
            Self::RevealRequest { id, .. }
            | Self::Revealed { id }
            | Self::OpenRequest { id }
            | Self::Opened { id } => *id,
        }
    }
}
