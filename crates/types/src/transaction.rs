//! Transaction, clause and feature types.
//!
//! A transaction is a signed list of clauses sharing one nonce and gas
//! budget. Its id is `keccak(signing_hash ‖ origin)`, so the id pins
//! both content and signer. The 8-byte block ref anchors the tx to a
//! chain position: the first four bytes are a block number, and the tx
//! expires `expiration` blocks after that number.

use crate::params::{CLAUSE_GAS, CLAUSE_GAS_CONTRACT_CREATION, TX_GAS};
use crate::{Address, Bytes32, Error, Result};
use rlp::RlpStream;
use serde::{Deserialize, Serialize};
use thor_crypto::Signature;

/// Feature bitset carried by transactions and summed into the header's
/// `tx_features` field.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Features(pub u32);

impl Features {
    /// Bit 0: designated gas payer (VIP-191 delegation).
    pub const DELEGATION: Features = Features(1);

    /// Checks whether all bits of `other` are set in `self`.
    #[inline]
    pub fn contains(&self, other: Features) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets the bits of `other`.
    #[inline]
    pub fn insert(&mut self, other: Features) {
        self.0 |= other.0;
    }
}

/// A single call or contract creation within a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    /// Recipient; `None` creates a contract.
    pub to: Option<Address>,
    /// Value transferred, in wei.
    pub value: u128,
    /// Call data or creation bytecode.
    pub data: Vec<u8>,
}

impl Clause {
    /// Creates a clause calling `to`.
    pub fn new(to: Address) -> Self {
        Self {
            to: Some(to),
            value: 0,
            data: Vec::new(),
        }
    }

    /// Sets the transferred value.
    pub fn with_value(mut self, value: u128) -> Self {
        self.value = value;
        self
    }

    /// Sets the call data.
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }
}

/// An 8-byte reference anchoring a tx to a block: number in the first
/// four bytes, a block-id fragment in the rest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct BlockRef(pub [u8; 8]);

impl BlockRef {
    /// Creates a ref naming only a block number.
    pub fn from_number(number: u32) -> Self {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&number.to_be_bytes());
        Self(bytes)
    }

    /// Creates a ref from a block id (number prefix plus the first four
    /// bytes of the id body).
    pub fn from_id(id: Bytes32) -> Self {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&id.as_bytes()[..8]);
        Self(bytes)
    }

    /// The referenced block number.
    #[inline]
    pub fn number(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

/// A signed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Chain tag, the last byte of the genesis id.
    pub chain_tag: u8,
    /// Block reference; see [`BlockRef`].
    pub block_ref: BlockRef,
    /// Number of blocks after `block_ref` before the tx expires.
    pub expiration: u32,
    /// Ordered clauses.
    pub clauses: Vec<Clause>,
    /// Gas price coefficient.
    pub gas_price_coef: u8,
    /// Gas budget.
    pub gas: u64,
    /// Id of a tx that must be included and unreverted first.
    pub depends_on: Option<Bytes32>,
    /// Nonce chosen by the sender.
    pub nonce: u64,
    /// Enabled features.
    pub features: Features,
    /// Recoverable signature over the signing hash; empty until signed.
    pub signature: Vec<u8>,
}

impl Transaction {
    /// The hash the origin signs: Keccak256 of the RLP encoding of all
    /// fields except the signature.
    pub fn signing_hash(&self) -> Bytes32 {
        let mut stream = RlpStream::new_list(9);
        stream.append(&self.chain_tag);
        stream.append(&self.block_ref.0.to_vec());
        stream.append(&self.expiration);
        stream.begin_list(self.clauses.len());
        for clause in &self.clauses {
            stream.begin_list(3);
            match &clause.to {
                Some(to) => stream.append(to),
                None => stream.append_empty_data(),
            };
            stream.append(&clause.value.to_be_bytes().to_vec());
            stream.append(&clause.data);
        }
        stream.append(&self.gas_price_coef);
        stream.append(&self.gas);
        match &self.depends_on {
            Some(dep) => stream.append(dep),
            None => stream.append_empty_data(),
        };
        stream.append(&self.nonce);
        stream.append(&self.features.0);
        Bytes32::keccak256(&stream.out())
    }

    /// Recovers the origin address from the signature.
    pub fn origin(&self) -> Result<Address> {
        let sig = Signature::from_slice(&self.signature)
            .map_err(|_| Error::Signature("invalid signature length".to_string()))?;
        let addr = sig
            .recover_address(self.signing_hash().as_fixed_bytes())
            .map_err(|e| Error::Signature(e.to_string()))?;
        Ok(Address::new(addr))
    }

    /// The transaction id: `keccak(signing_hash ‖ origin)`.
    pub fn id(&self) -> Result<Bytes32> {
        let origin = self.origin()?;
        Ok(Bytes32::keccak256_concat(&[
            self.signing_hash().as_bytes(),
            origin.as_bytes(),
        ]))
    }

    /// Whether the tx has expired at `block_number`.
    #[inline]
    pub fn is_expired(&self, block_number: u32) -> bool {
        (block_number as u64) > self.block_ref.number() as u64 + self.expiration as u64
    }

    /// Intrinsic gas: the cost charged before any execution happens.
    pub fn intrinsic_gas(&self) -> u64 {
        if self.clauses.is_empty() {
            return TX_GAS + CLAUSE_GAS;
        }
        let mut total = TX_GAS;
        for clause in &self.clauses {
            total += if clause.to.is_some() {
                CLAUSE_GAS
            } else {
                CLAUSE_GAS_CONTRACT_CREATION
            };
            // 68 gas per non-zero byte, 4 per zero byte
            for byte in &clause.data {
                total += if *byte == 0 { 4 } else { 68 };
            }
        }
        total
    }

    /// The full wire encoding, including the signature. Used as the
    /// merkle leaf for the txs root.
    pub fn encoded(&self) -> Vec<u8> {
        let mut stream = RlpStream::new_list(2);
        stream.append(&self.signing_hash());
        stream.append(&self.signature);
        stream.out().to_vec()
    }
}

/// Builder for [`Transaction`], mirroring the header builder.
#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    chain_tag: u8,
    block_ref: BlockRef,
    expiration: u32,
    clauses: Vec<Clause>,
    gas_price_coef: u8,
    gas: u64,
    depends_on: Option<Bytes32>,
    nonce: u64,
    features: Features,
}

impl TransactionBuilder {
    /// Creates a builder for chain `chain_tag`.
    pub fn new(chain_tag: u8) -> Self {
        Self {
            chain_tag,
            ..Default::default()
        }
    }

    /// Sets the block ref.
    pub fn block_ref(mut self, block_ref: BlockRef) -> Self {
        self.block_ref = block_ref;
        self
    }

    /// Sets the expiration window in blocks.
    pub fn expiration(mut self, expiration: u32) -> Self {
        self.expiration = expiration;
        self
    }

    /// Appends a clause.
    pub fn clause(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    /// Sets the gas price coefficient.
    pub fn gas_price_coef(mut self, coef: u8) -> Self {
        self.gas_price_coef = coef;
        self
    }

    /// Sets the gas budget.
    pub fn gas(mut self, gas: u64) -> Self {
        self.gas = gas;
        self
    }

    /// Sets the dependency.
    pub fn depends_on(mut self, id: Bytes32) -> Self {
        self.depends_on = Some(id);
        self
    }

    /// Sets the nonce.
    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Sets the feature bits.
    pub fn features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    /// Builds the unsigned transaction.
    pub fn build(self) -> Transaction {
        Transaction {
            chain_tag: self.chain_tag,
            block_ref: self.block_ref,
            expiration: self.expiration,
            clauses: self.clauses,
            gas_price_coef: self.gas_price_coef,
            gas: self.gas,
            depends_on: self.depends_on,
            nonce: self.nonce,
            features: self.features,
            signature: Vec::new(),
        }
    }

    /// Builds and signs with `sk`.
    pub fn build_signed(self, sk: &thor_crypto::PrivateKey) -> Transaction {
        let mut tx = self.build();
        let sig = sk
            .sign(tx.signing_hash().as_fixed_bytes())
            .expect("signing cannot fail for a valid key");
        tx.signature = sig.as_bytes().to_vec();
        tx
    }
}
