//! TLS 1.3 key schedule (RFC 8446 §7.1).
//!
//! ```text
//!             0
//!             |
//!   PSK ->  HKDF-Extract = Early Secret  --> "res binder"
//!             |
//!       Derive-Secret(., "derived", "")
//!             |
//!  (EC)DHE -> HKDF-Extract = Handshake Secret --> "c hs traffic" / "s hs traffic"
//!             |
//!       Derive-Secret(., "derived", "")
//!             |
//!   0 -> HKDF-Extract = Master Secret --> "c ap traffic" / "s ap traffic" / "res master"
//! ```

use super::hkdf::{derive_secret, empty_hash, hkdf_expand_label, hkdf_extract};
use pssl_crypto::hmac::hmac;
use pssl_types::{HashAlgId, TlsError};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Initial,
    Early,
    Handshake,
    Master,
}

/// The secret chain for one connection. Only the current stage's secret
/// is kept.
pub struct KeySchedule {
    hash: HashAlgId,
    stage: Stage,
    secret: Zeroizing<Vec<u8>>,
}

/// Record protection key and static IV for one direction.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct TrafficKeys {
    pub key: Vec<u8>,
    pub iv: Vec<u8>,
}

impl KeySchedule {
    pub fn new(hash: HashAlgId) -> Self {
        Self {
            hash,
            stage: Stage::Initial,
            secret: Zeroizing::new(Vec::new()),
        }
    }

    pub fn hash(&self) -> HashAlgId {
        self.hash
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn expect(&self, stage: Stage, what: &'static str) -> Result<(), TlsError> {
        if self.stage != stage {
            return Err(TlsError::InvalidState(what));
        }
        Ok(())
    }

    /// Early Secret from a resumption PSK, or from zeros for a full handshake.
    pub fn derive_early_secret(&mut self, psk: Option<&[u8]>) -> Result<(), TlsError> {
        self.expect(Stage::Initial, "early secret derived twice")?;
        let zeros = vec![0u8; self.hash.output_len()];
        self.secret = hkdf_extract(self.hash, &[], psk.unwrap_or(&zeros))?;
        self.stage = Stage::Early;
        Ok(())
    }

    /// `binder_key` for resumption PSKs.
    pub fn binder_key(&self) -> Result<Zeroizing<Vec<u8>>, TlsError> {
        self.expect(Stage::Early, "binder key outside early stage")?;
        derive_secret(self.hash, &self.secret, b"res binder", &empty_hash(self.hash))
    }

    fn advance(&mut self, ikm: &[u8]) -> Result<(), TlsError> {
        let salt = derive_secret(self.hash, &self.secret, b"derived", &empty_hash(self.hash))?;
        self.secret = hkdf_extract(self.hash, &salt, ikm)?;
        Ok(())
    }

    pub fn derive_handshake_secret(&mut self, shared_secret: &[u8]) -> Result<(), TlsError> {
        self.expect(Stage::Early, "handshake secret out of order")?;
        self.advance(shared_secret)?;
        self.stage = Stage::Handshake;
        Ok(())
    }

    /// `(client, server)` handshake traffic secrets over
    /// Hash(ClientHello..ServerHello).
    pub fn handshake_traffic_secrets(
        &self,
        transcript_hash: &[u8],
    ) -> Result<(Zeroizing<Vec<u8>>, Zeroizing<Vec<u8>>), TlsError> {
        self.expect(Stage::Handshake, "handshake traffic out of order")?;
        Ok((
            derive_secret(self.hash, &self.secret, b"c hs traffic", transcript_hash)?,
            derive_secret(self.hash, &self.secret, b"s hs traffic", transcript_hash)?,
        ))
    }

    pub fn derive_master_secret(&mut self) -> Result<(), TlsError> {
        self.expect(Stage::Handshake, "master secret out of order")?;
        let zeros = vec![0u8; self.hash.output_len()];
        self.advance(&zeros)?;
        self.stage = Stage::Master;
        Ok(())
    }

    /// `(client, server)` application traffic secrets over
    /// Hash(ClientHello..server Finished).
    pub fn application_traffic_secrets(
        &self,
        transcript_hash: &[u8],
    ) -> Result<(Zeroizing<Vec<u8>>, Zeroizing<Vec<u8>>), TlsError> {
        self.expect(Stage::Master, "application traffic out of order")?;
        Ok((
            derive_secret(self.hash, &self.secret, b"c ap traffic", transcript_hash)?,
            derive_secret(self.hash, &self.secret, b"s ap traffic", transcript_hash)?,
        ))
    }

    /// Resumption master secret over Hash(ClientHello..client Finished).
    pub fn resumption_master_secret(&self, transcript_hash: &[u8]) -> Result<Zeroizing<Vec<u8>>, TlsError> {
        self.expect(Stage::Master, "resumption secret out of order")?;
        derive_secret(self.hash, &self.secret, b"res master", transcript_hash)
    }
}

/// Key and IV for a traffic secret.
pub fn traffic_keys(hash: HashAlgId, secret: &[u8], key_len: usize) -> Result<TrafficKeys, TlsError> {
    let key = hkdf_expand_label(hash, secret, b"key", b"", key_len)?;
    let iv = hkdf_expand_label(hash, secret, b"iv", b"", 12)?;
    Ok(TrafficKeys {
        key: key.to_vec(),
        iv: iv.to_vec(),
    })
}

/// Next-generation traffic secret for KeyUpdate.
pub fn next_traffic_secret(hash: HashAlgId, secret: &[u8]) -> Result<Zeroizing<Vec<u8>>, TlsError> {
    hkdf_expand_label(hash, secret, b"traffic upd", b"", hash.output_len())
}

pub fn finished_key(hash: HashAlgId, base_key: &[u8]) -> Result<Zeroizing<Vec<u8>>, TlsError> {
    hkdf_expand_label(hash, base_key, b"finished", b"", hash.output_len())
}

/// `HMAC(finished_key, transcript_hash)`, used for Finished and PSK binders.
pub fn finished_verify_data(
    hash: HashAlgId,
    base_key: &[u8],
    transcript_hash: &[u8],
) -> Result<Vec<u8>, TlsError> {
    let key = finished_key(hash, base_key)?;
    Ok(hmac(hash, &key, &[transcript_hash])?)
}

/// PSK carried by a ticket with the given nonce.
pub fn ticket_psk(hash: HashAlgId, resumption_master: &[u8], nonce: &[u8]) -> Result<Zeroizing<Vec<u8>>, TlsError> {
    hkdf_expand_label(hash, resumption_master, b"resumption", nonce, hash.output_len())
}

/// Binder over the hash of the ClientHello truncated before the binders
/// list (prefixed by the HelloRetryRequest exchange when there was one).
pub fn compute_binder(hash: HashAlgId, psk: &[u8], truncated_hash: &[u8]) -> Result<Vec<u8>, TlsError> {
    let mut ks = KeySchedule::new(hash);
    ks.derive_early_secret(Some(psk))?;
    let binder_key = ks.binder_key()?;
    finished_verify_data(hash, &binder_key, truncated_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypt::hex;

    const SHARED: &str = "8bd4054fb55b9d63fdfbacf9f04b9f0d35e6d63f537563efd46272900f89492d";
    const HELLO_HASH: &str = "860c06edc07858ee8e78f0e7428c58edd6b43f2ca3e6e95f02ed063cf0e1cad8";
    const SERVER_FIN_HASH: &str = "9608102a0f1ccc6db6250b7b7e417b1a000eaada3daae4777a7686c9ff83df13";
    const CLIENT_FIN_HASH: &str = "209145a96ee8e2a122ff810047cc952684658d6049e86429426db87c54ad143d";

    // RFC 8448 §3, simple 1-RTT handshake.
    #[test]
    fn test_rfc8448_full_chain() {
        let mut ks = KeySchedule::new(HashAlgId::Sha256);
        ks.derive_early_secret(None).unwrap();
        ks.derive_handshake_secret(&hex(SHARED)).unwrap();
        let (c_hs, s_hs) = ks.handshake_traffic_secrets(&hex(HELLO_HASH)).unwrap();
        assert_eq!(
            *c_hs,
            hex("b3eddb126e067f35a780b3abf45e2d8f3b1a950738f52e9600746a0e27a55a21")
        );
        assert_eq!(
            *s_hs,
            hex("b67b7d690cc16c4e75e54213cb2d37b4e9c912bcded9105d42befd59d391ad38")
        );

        let keys = traffic_keys(HashAlgId::Sha256, &s_hs, 16).unwrap();
        assert_eq!(keys.key, hex("3fce516009c21727d0f2e4e86ee403bc"));
        assert_eq!(keys.iv, hex("5d313eb2671276ee13000b30"));
        assert_eq!(
            *finished_key(HashAlgId::Sha256, &s_hs).unwrap(),
            hex("008d3b66f816ea559f96b537e885c31fc068bf492c652f01f288a1d8cdc19fc8")
        );

        ks.derive_master_secret().unwrap();
        let (c_ap, s_ap) = ks.application_traffic_secrets(&hex(SERVER_FIN_HASH)).unwrap();
        assert_eq!(
            *c_ap,
            hex("9e40646ce79a7f9dc05af8889bce6552875afa0b06df0087f792ebb7c17504a5")
        );
        assert_eq!(
            *s_ap,
            hex("a11af9f05531f856ad47116b45a950328204b4f44bfb6b3a4b4f1f3fcb631643")
        );

        let rms = ks.resumption_master_secret(&hex(CLIENT_FIN_HASH)).unwrap();
        assert_eq!(
            *rms,
            hex("7df235f2031d2a051287d02b0241b0bfdaf86cc856231f2d5aba46c434ec196c")
        );
        assert_eq!(
            *ticket_psk(HashAlgId::Sha256, &rms, &[0, 0]).unwrap(),
            hex("4ecd0eb6ec3b4d87f5d6028f922ca4c5851a277fd41311c9e62d2c9492e1c4f3")
        );
        assert_eq!(
            *next_traffic_secret(HashAlgId::Sha256, &c_ap).unwrap(),
            hex("fcdfcc72725aaee48bf64e4fd8b749cdbdbab39d90da0b26e2245ca6ea167207")
        );
    }

    #[test]
    fn test_binder_key_from_zero_psk() {
        let mut ks = KeySchedule::new(HashAlgId::Sha256);
        ks.derive_early_secret(Some(&[0u8; 32])).unwrap();
        assert_eq!(
            *ks.binder_key().unwrap(),
            hex("feb866868b62f7e0d14c2547bae6c86d16c6db9d7e8af4e4ba1652b69fee9ba0")
        );
    }

    #[test]
    fn test_stages_are_enforced() {
        let mut ks = KeySchedule::new(HashAlgId::Sha384);
        assert!(ks.derive_handshake_secret(&[1; 48]).is_err());
        ks.derive_early_secret(None).unwrap();
        assert!(ks.derive_early_secret(None).is_err());
        assert!(ks.application_traffic_secrets(&[0; 48]).is_err());
        ks.derive_handshake_secret(&[1; 48]).unwrap();
        assert!(ks.binder_key().is_err());
        ks.derive_master_secret().unwrap();
        assert_eq!(ks.stage(), Stage::Master);
    }

    #[test]
    fn test_binder_depends_on_psk() {
        let a = compute_binder(HashAlgId::Sha256, &[1; 32], &[5; 32]).unwrap();
        let b = compute_binder(HashAlgId::Sha256, &[2; 32], &[5; 32]).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
