// oasys-chain/src/transaction.rs

use crate::encode::{append_amount, append_bytes, append_opt_address};
use crate::types::{Amount, Gas, Nonce};
use crate::{ChainError, ChainResult};
use oasys_crypto::{keccak256, recover, Address, Hash, Keypair, Signature};
use rlp::RlpStream;
use serde::{Deserialize, Serialize};

/// Legacy (pre-typed) transaction with EIP-155 replay protection.
///
/// System transactions are ordinary transactions with `gas_price == 0`,
/// signed by the block proposer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub nonce: Nonce,
    pub gas_price: Amount,
    pub gas: Gas,
    /// `None` creates a contract
    pub to: Option<Address>,
    pub value: Amount,
    pub input: Vec<u8>,
    /// Recovery id folded with the chain id (EIP-155)
    pub v: u64,
    pub r: Amount,
    pub s: Amount,
}

impl Transaction {
    /// Build an unsigned call transaction
    pub fn call(nonce: Nonce, to: Address, value: Amount, gas: Gas, gas_price: Amount, input: Vec<u8>) -> Self {
        Self {
            nonce,
            gas_price,
            gas,
            to: Some(to),
            value,
            input,
            v: 0,
            r: Amount::zero(),
            s: Amount::zero(),
        }
    }

    pub fn is_signed(&self) -> bool {
        !self.r.is_zero() || !self.s.is_zero()
    }

    /// Zero gas price marks engine-driven system calls
    pub fn is_zero_priced(&self) -> bool {
        self.gas_price.is_zero()
    }

    /// EIP-155 signing hash: Keccak-256 of
    /// `rlp([nonce, gasPrice, gas, to, value, input, chainId, 0, 0])`.
    /// Identical for a transaction and its signed counterpart.
    pub fn sig_hash(&self, chain_id: u64) -> Hash {
        let mut s = RlpStream::new();
        s.begin_list(9);
        s.append(&self.nonce);
        append_amount(&mut s, &self.gas_price);
        s.append(&self.gas);
        append_opt_address(&mut s, &self.to);
        append_amount(&mut s, &self.value);
        append_bytes(&mut s, &self.input);
        s.append(&chain_id);
        s.append(&0u8);
        s.append(&0u8);
        keccak256(&s.out())
    }

    /// Transaction hash: Keccak-256 of the signed RLP encoding
    pub fn hash(&self) -> Hash {
        let mut s = RlpStream::new();
        s.begin_list(9);
        s.append(&self.nonce);
        append_amount(&mut s, &self.gas_price);
        s.append(&self.gas);
        append_opt_address(&mut s, &self.to);
        append_amount(&mut s, &self.value);
        append_bytes(&mut s, &self.input);
        s.append(&self.v);
        append_amount(&mut s, &self.r);
        append_amount(&mut s, &self.s);
        keccak256(&s.out())
    }

    /// Attach an EIP-155 signature
    pub fn with_signature(mut self, signature: &Signature, chain_id: u64) -> Self {
        self.r = Amount::from_be_bytes(&signature.compact()[..32]);
        self.s = Amount::from_be_bytes(&signature.compact()[32..64]);
        self.v = signature.recovery_id() as u64 + chain_id * 2 + 35;
        self
    }

    /// Sign with a local keypair
    pub fn signed(self, keypair: &Keypair, chain_id: u64) -> ChainResult<Self> {
        let digest = self.sig_hash(chain_id);
        let signature = keypair.sign_hash(&digest)?;
        Ok(self.with_signature(&signature, chain_id))
    }

    /// Recover the sender address
    pub fn sender(&self, chain_id: u64) -> ChainResult<Address> {
        if !self.is_signed() {
            return Err(ChainError::InvalidTransaction("unsigned".into()));
        }
        let recovery_id = self
            .v
            .checked_sub(chain_id * 2 + 35)
            .filter(|id| *id < 4)
            .ok_or_else(|| ChainError::InvalidTransaction("bad replay-protection v".into()))?;

        let mut bytes = [0u8; 65];
        let r = self.r.to_be_bytes_trimmed();
        let s = self.s.to_be_bytes_trimmed();
        if r.len() > 32 || s.len() > 32 {
            return Err(ChainError::InvalidTransaction("oversized r/s".into()));
        }
        bytes[32 - r.len()..32].copy_from_slice(&r);
        bytes[64 - s.len()..64].copy_from_slice(&s);
        bytes[64] = recovery_id as u8;

        let digest = self.sig_hash(chain_id);
        Ok(recover(&digest, &Signature::new(bytes))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAIN_ID: u64 = 12345;

    fn sample_tx(nonce: u64) -> Transaction {
        Transaction::call(
            nonce,
            Address::new([0x10; 20]),
            Amount::zero(),
            9_000_000,
            Amount::zero(),
            vec![0xde, 0xad, 0xbe, 0xef],
        )
    }

    #[test]
    fn test_sig_hash_ignores_signature() {
        let keypair = Keypair::generate();
        let tx = sample_tx(0);
        let unsigned_hash = tx.sig_hash(CHAIN_ID);
        let signed = tx.signed(&keypair, CHAIN_ID).unwrap();
        assert_eq!(unsigned_hash, signed.sig_hash(CHAIN_ID));
        assert_ne!(signed.hash(), unsigned_hash);
    }

    #[test]
    fn test_sender_recovery() {
        let keypair = Keypair::generate();
        let signed = sample_tx(3).signed(&keypair, CHAIN_ID).unwrap();
        assert_eq!(signed.sender(CHAIN_ID).unwrap(), keypair.address());
    }

    #[test]
    fn test_sender_rejects_unsigned() {
        assert!(sample_tx(0).sender(CHAIN_ID).is_err());
    }

    #[test]
    fn test_sender_rejects_wrong_chain_id() {
        let keypair = Keypair::generate();
        let signed = sample_tx(0).signed(&keypair, CHAIN_ID).unwrap();
        assert!(signed.sender(CHAIN_ID + 1).is_err() || signed.sender(CHAIN_ID + 1).unwrap() != keypair.address());
    }

    #[test]
    fn test_zero_priced_marker() {
        let tx = sample_tx(0);
        assert!(tx.is_zero_priced());
        let mut paid = tx;
        paid.gas_price = Amount::from_u64(1);
        assert!(!paid.is_zero_priced());
    }
}
