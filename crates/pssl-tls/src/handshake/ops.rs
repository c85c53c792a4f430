//! The async-op slot: long public-key work handed from a handshake state
//! to the connection's update loop, which polls it once per tick.

use crate::alert::{protocol, AlertDescription};
use crate::store::ChainCheck;
use pssl_crypto::ecdh::{EcdhAgree, EcdhKeyPair, EcdhKeygen};
use pssl_crypto::rsa::RsaOp;
use pssl_crypto::step::{Progress, StepOp};
use pssl_pki::x509::{SignOp, VerifyOp};
use pssl_types::{CryptoError, TlsError};
use zeroize::Zeroizing;

/// A resumable operation in flight.
pub enum AsyncOp {
    Sign(SignOp),
    Verify(VerifyOp),
    Keygen(EcdhKeygen),
    Agree(EcdhAgree),
    Rsa(RsaOp),
    Chain(Box<ChainCheck>),
}

/// What a finished [`AsyncOp`] produced.
pub enum OpOutput {
    Signature(Vec<u8>),
    Verified,
    KeyPair(EcdhKeyPair),
    Shared(Zeroizing<Vec<u8>>),
    Rsa(Zeroizing<Vec<u8>>),
    ChainValid,
}

impl std::fmt::Debug for AsyncOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl AsyncOp {
    pub fn name(&self) -> &'static str {
        match self {
            AsyncOp::Sign(_) => "sign",
            AsyncOp::Verify(_) => "verify",
            AsyncOp::Keygen(_) => "keygen",
            AsyncOp::Agree(_) => "agree",
            AsyncOp::Rsa(_) => "rsa",
            AsyncOp::Chain(_) => "chain",
        }
    }

    /// Advance by one bounded step.
    ///
    /// Signature failures become `decrypt_error`, a bad peer key share
    /// becomes `illegal_parameter`.
    pub fn poll(&mut self) -> Result<Progress<OpOutput>, TlsError> {
        let progress = match self {
            AsyncOp::Sign(op) => op.poll()?.map(OpOutput::Signature),
            AsyncOp::Verify(op) => op
                .poll()
                .map_err(|e| match e {
                    CryptoError::RsaVerifyFail | CryptoError::EcdsaVerifyFail | CryptoError::RsaInvalidPadding => {
                        protocol(AlertDescription::DecryptError, "signature verification failed")
                    }
                    other => TlsError::from(other),
                })?
                .map(|()| OpOutput::Verified),
            AsyncOp::Keygen(op) => op.poll()?.map(OpOutput::KeyPair),
            AsyncOp::Agree(op) => op
                .poll()
                .map_err(|_| protocol(AlertDescription::IllegalParameter, "invalid peer key share"))?
                .map(OpOutput::Shared),
            AsyncOp::Rsa(op) => op.poll()?.map(|v| OpOutput::Rsa(Zeroizing::new(v))),
            AsyncOp::Chain(op) => op.poll()?.map(|()| OpOutput::ChainValid),
        };
        Ok(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pssl_types::EccCurveId;

    fn drive(mut op: AsyncOp) -> (Result<OpOutput, TlsError>, usize) {
        let mut polls = 0;
        loop {
            polls += 1;
            match op.poll() {
                Ok(Progress::Pending) => continue,
                Ok(Progress::Done(out)) => return (Ok(out), polls),
                Err(e) => return (Err(e), polls),
            }
        }
    }

    #[test]
    fn test_key_agreement_through_the_slot_takes_several_polls() {
        let (a, polls) = drive(AsyncOp::Keygen(EcdhKeyPair::begin_generate(EccCurveId::NistP256).unwrap()));
        assert!(polls > 1);
        let Ok(OpOutput::KeyPair(a)) = a else { panic!("keygen") };
        let (b, _) = drive(AsyncOp::Keygen(EcdhKeyPair::begin_generate(EccCurveId::NistP256).unwrap()));
        let Ok(OpOutput::KeyPair(b)) = b else { panic!("keygen") };
        let (ab, _) = drive(AsyncOp::Agree(a.begin_agree(b.public_key()).unwrap()));
        let (ba, _) = drive(AsyncOp::Agree(b.begin_agree(a.public_key()).unwrap()));
        match (ab, ba) {
            (Ok(OpOutput::Shared(x)), Ok(OpOutput::Shared(y))) => assert_eq!(*x, *y),
            _ => panic!("agreement failed"),
        }
    }

    #[test]
    fn test_bad_share_maps_to_illegal_parameter() {
        let (kp, _) = drive(AsyncOp::Keygen(EcdhKeyPair::begin_generate(EccCurveId::X25519).unwrap()));
        let Ok(OpOutput::KeyPair(kp)) = kp else { panic!("keygen") };
        let (res, _) = drive(AsyncOp::Agree(kp.begin_agree(&[0u8; 32]).unwrap()));
        match res {
            Err(TlsError::Protocol { alert, .. }) => assert_eq!(alert, AlertDescription::IllegalParameter as u8),
            _ => panic!("zero share accepted"),
        }
    }
}
