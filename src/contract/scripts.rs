//! Cadence transaction templates.
//!
//! Templates carry `{{PLACEHOLDER}}` imports that are filled in with the
//! configured contract addresses before a transaction is stored.

use crate::chain::Address;
use crate::domain::ContractRef;

const LINK_ESCROW_PROVIDER: &str = r#"
import NonFungibleToken from {{NON_FUNGIBLE_TOKEN}}
import {{COLLECTIBLE_NAME}} from {{COLLECTIBLE_ADDRESS}}

transaction() {
    prepare(signer: AuthAccount) {
        let path = /private/{{COLLECTIBLE_NAME}}EscrowProvider
        if !signer.getCapability<&{NonFungibleToken.Provider}>(path).check() {
            signer.unlink(path)
            signer.link<&{NonFungibleToken.Provider}>(path, target: {{COLLECTIBLE_NAME}}.CollectionStoragePath)
        }
    }
}
"#;

const SET_PACK_ISSUER_CAP: &str = r#"
import {{PDS_NAME}} from {{PDS_ADDRESS}}

transaction(issuer: Address) {
    prepare(signer: AuthAccount) {
        let creator = signer.borrow<&{{PDS_NAME}}.DistributionCreator>(from: {{PDS_NAME}}.DistCreatorStoragePath)
            ?? panic("no distribution creator")
        let cap = getAccount(issuer)
            .getCapability<&{{{PDS_NAME}}.PackIssuerCapReciever}>({{PDS_NAME}}.PackIssuerCapRecieverPublicPath)
            .borrow()
            ?? panic("issuer has no pack issuer capability receiver")
        cap.setDistCap(cap: signer.getCapability<&{{PDS_NAME}}.DistributionCreator{{{PDS_NAME}}.IDistCreator}>({{PDS_NAME}}.DistCreatorPrivPath))
    }
}
"#;

const SETTLE: &str = r#"
import {{PDS_NAME}} from {{PDS_ADDRESS}}
import NonFungibleToken from {{NON_FUNGIBLE_TOKEN}}
import {{COLLECTIBLE_NAME}} from {{COLLECTIBLE_ADDRESS}}

transaction(distId: UInt64, nftIDs: [UInt64]) {
    prepare(pds: AuthAccount) {
        let manager = pds.borrow<&{{PDS_NAME}}.DistributionManager>(from: {{PDS_NAME}}.DistManagerStoragePath)
            ?? panic("no distribution manager")
        let escrow = pds.getCapability<&{NonFungibleToken.CollectionPublic}>({{COLLECTIBLE_NAME}}.CollectionPublicPath)
            .borrow()
            ?? panic("no escrow collection")
        manager.withdraw(distId: distId, nftIDs: nftIDs, escrowCollectionPublic: escrow)
    }
}
"#;

const MINT: &str = r#"
import {{PDS_NAME}} from {{PDS_ADDRESS}}
import NonFungibleToken from {{NON_FUNGIBLE_TOKEN}}
import {{PACK_NAME}} from {{PACK_ADDRESS}}

transaction(distId: UInt64, commitHashes: [String], issuer: Address) {
    prepare(pds: AuthAccount) {
        let manager = pds.borrow<&{{PDS_NAME}}.DistributionManager>(from: {{PDS_NAME}}.DistManagerStoragePath)
            ?? panic("no distribution manager")
        let recipient = getAccount(issuer)
            .getCapability<&{NonFungibleToken.CollectionPublic}>({{PACK_NAME}}.CollectionPublicPath)
            .borrow()
            ?? panic("issuer has no pack collection")
        manager.mintPackNFT(distId: distId, commitHashes: commitHashes, issuer: issuer, recvCap: recipient)
    }
}
"#;

const REVEAL: &str = r#"
import {{PDS_NAME}} from {{PDS_ADDRESS}}
import NonFungibleToken from {{NON_FUNGIBLE_TOKEN}}
import {{PACK_NAME}} from {{PACK_ADDRESS}}

transaction(
    distId: UInt64,
    packId: UInt64,
    nftContractAddrs: [Address],
    nftContractNames: [String],
    nftIds: [UInt64],
    salt: String,
    owner: Address,
    openRequest: Bool
) {
    prepare(pds: AuthAccount) {
        let manager = pds.borrow<&{{PDS_NAME}}.DistributionManager>(from: {{PDS_NAME}}.DistManagerStoragePath)
            ?? panic("no distribution manager")
        let recipient = getAccount(owner)
            .getCapability<&{NonFungibleToken.CollectionPublic}>({{PACK_NAME}}.CollectionPublicPath)
        manager.revealPackNFT(
            distId: distId,
            packId: packId,
            nftContractAddrs: nftContractAddrs,
            nftContractName: nftContractNames,
            nftIds: nftIds,
            salt: salt,
            owner: owner,
            openRequest: openRequest,
            recvCap: recipient
        )
    }
}
"#;

const OPEN: &str = r#"
import {{PDS_NAME}} from {{PDS_ADDRESS}}
import NonFungibleToken from {{NON_FUNGIBLE_TOKEN}}

transaction(
    distId: UInt64,
    packId: UInt64,
    nftContractAddrs: [Address],
    nftContractNames: [String],
    nftIds: [UInt64],
    owner: Address
) {
    prepare(pds: AuthAccount) {
        let manager = pds.borrow<&{{PDS_NAME}}.DistributionManager>(from: {{PDS_NAME}}.DistManagerStoragePath)
            ?? panic("no distribution manager")
        manager.openPackNFT(
            distId: distId,
            packId: packId,
            nftContractAddrs: nftContractAddrs,
            nftContractName: nftContractNames,
            nftIds: nftIds,
            owner: owner
        )
    }
}
"#;

const UPDATE_DIST_STATE: &str = r#"
import {{PDS_NAME}} from {{PDS_ADDRESS}}

transaction(distId: UInt64, state: UInt8) {
    prepare(pds: AuthAccount) {
        let manager = pds.borrow<&{{PDS_NAME}}.DistributionManager>(from: {{PDS_NAME}}.DistManagerStoragePath)
            ?? panic("no distribution manager")
        manager.updateDistState(distId: distId, state: {{PDS_NAME}}.DistState(rawValue: state)!)
    }
}
"#;

/// Renders templates against the configured contract deployment.
#[derive(Debug, Clone)]
pub struct Scripts {
    pds: ContractRef,
    non_fungible_token: Address,
}

impl Scripts {
    pub fn new(pds: ContractRef, non_fungible_token: Address) -> Self {
        Self { pds, non_fungible_token }
    }

    pub fn link_escrow_provider(&self, collectible: &ContractRef) -> String {
        self.render(LINK_ESCROW_PROVIDER, Some(collectible), None)
    }

    pub fn set_pack_issuer_cap(&self) -> String {
        self.render(SET_PACK_ISSUER_CAP, None, None)
    }

    pub fn settle(&self, collectible: &ContractRef) -> String {
        self.render(SETTLE, Some(collectible), None)
    }

    pub fn mint(&self, pack: &ContractRef) -> String {
        self.render(MINT, None, Some(pack))
    }

    pub fn reveal(&self, pack: &ContractRef) -> String {
        self.render(REVEAL, None, Some(pack))
    }

    pub fn open(&self, pack: &ContractRef) -> String {
        self.render(OPEN, None, Some(pack))
    }

    pub fn update_dist_state(&self) -> String {
        self.render(UPDATE_DIST_STATE, None, None)
    }

    fn render(&self, template: &str, collectible: Option<&ContractRef>, pack: Option<&ContractRef>) -> String {
        let mut script = template
            .trim_start()
            .replace("{{PDS_NAME}}", &self.pds.name)
            .replace("{{PDS_ADDRESS}}", &self.pds.address.to_string())
            .replace("{{NON_FUNGIBLE_TOKEN}}", &self.non_fungible_token.to_string());
        if let Some(c) = collectible {
            script = script
                .replace("{{COLLECTIBLE_NAME}}", &c.name)
                .replace("{{COLLECTIBLE_ADDRESS}}", &c.address.to_string());
        }
        if let Some(p) = pack {
            script = script
                .replace("{{PACK_NAME}}", &p.name)
                .replace("{{PACK_ADDRESS}}", &p.address.to_string());
        }
        script
    }
}
