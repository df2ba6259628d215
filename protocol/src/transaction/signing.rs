//! Issuer and receiver signatures.
//!
//! Both parties sign the same canonical bytes through the [`Signer`]
//! trait. The signer must own the address named in the corresponding
//! field, and the digest it returns must equal the stored transaction hash;
//! a stale hash (fields edited after `build()`) is refused rather than
//! silently re-signed.

use super::builder::Transaction;
use super::verification::TransactionError;
use crate::crypto::Signer;

/// Signs `tx` as its issuer.
pub fn sign_as_issuer<'a>(
    tx: &'a mut Transaction,
    signer: &dyn Signer,
) -> Result<&'a Transaction, TransactionError> {
    if signer.address() != tx.issuer {
        return Err(TransactionError::SignerMismatch {
            expected: tx.issuer.clone(),
            actual: signer.address(),
        });
    }
    let (digest, signature) = signer.sign(&tx.signable_bytes());
    if digest != tx.hash {
        return Err(TransactionError::HashMismatch {
            expected: digest,
            actual: tx.hash,
        });
    }
    tx.issuer_signature = Some(signature);
    Ok(tx)
}

/// Co-signs `tx` as its receiver.
pub fn sign_as_receiver<'a>(
    tx: &'a mut Transaction,
    signer: &dyn Signer,
) -> Result<&'a Transaction, TransactionError> {
    if signer.address() != tx.receiver {
        return Err(TransactionError::SignerMismatch {
            expected: tx.receiver.clone(),
            actual: signer.address(),
        });
    }
    let (digest, signature) = signer.sign(&tx.signable_bytes());
    if digest != tx.hash {
        return Err(TransactionError::HashMismatch {
            expected: digest,
            actual: tx.hash,
        });
    }
    tx.receiver_signature = Some(signature);
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519Signer;
    use crate::transaction::builder::TransactionBuilder;
    use crate::transaction::spice::Spice;

    #[test]
    fn both_parties_sign() {
        let issuer = Ed25519Signer::generate();
        let receiver = Ed25519Signer::generate();
        let mut tx = TransactionBuilder::new(issuer.address(), receiver.address())
            .spice(Spice::from_currency(1))
            .build();

        sign_as_issuer(&mut tx, &issuer).unwrap();
        assert!(!tx.is_fully_signed());
        sign_as_receiver(&mut tx, &receiver).unwrap();
        assert!(tx.is_fully_signed());
    }

    #[test]
    fn wrong_party_refused() {
        let issuer = Ed25519Signer::generate();
        let receiver = Ed25519Signer::generate();
        let mut tx = TransactionBuilder::new(issuer.address(), receiver.address()).build();

        let err = sign_as_issuer(&mut tx, &receiver).unwrap_err();
        assert!(matches!(err, TransactionError::SignerMismatch { .. }));
        let err = sign_as_receiver(&mut tx, &issuer).unwrap_err();
        assert!(matches!(err, TransactionError::SignerMismatch { .. }));
        assert!(tx.issuer_signature.is_none());
        assert!(tx.receiver_signature.is_none());
    }

    #[test]
    fn stale_hash_refused() {
        let issuer = Ed25519Signer::generate();
        let receiver = Ed25519Signer::generate();
        let mut tx = TransactionBuilder::new(issuer.address(), receiver.address()).build();
        tx.subject = "edited after build".into();

        let err = sign_as_issuer(&mut tx, &issuer).unwrap_err();
        assert!(matches!(err, TransactionError::HashMismatch { .. }));
    }

    #[test]
    fn signing_does_not_change_hash() {
        let issuer = Ed25519Signer::generate();
        let receiver = Ed25519Signer::generate();
        let mut tx = TransactionBuilder::new(issuer.address(), receiver.address()).build();
        let hash = tx.hash;
        sign_as_issuer(&mut tx, &issuer).unwrap();
        sign_as_receiver(&mut tx, &receiver).unwrap();
        assert_eq!(tx.hash, hash);
        assert_eq!(tx.compute_hash(), hash);
    }
}
