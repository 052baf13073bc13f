//! Identity - master key derived from mnemonic + passphrase. Lives in RAM only.

use bip39::Mnemonic;
use bitcoin::bip32::{DerivationPath, Fingerprint, Xpriv, Xpub};
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::NetworkKind;
use zeroize::Zeroizing;

/// Errors while building or using an identity
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),
    #[error("Derivation failed: {0}")]
    DerivationFailed(String),
}

/// Master key of the session wallet.
pub struct WalletIdentity {
    master: Xpriv,
    fingerprint: Fingerprint,
}

impl WalletIdentity {
    /// BIP39 seed from `mnemonic` + `passphrase`, then the BIP32 master key.
    ///
    /// The seed only exists inside this call and is zeroed on return.
    pub fn from_mnemonic(
        secp: &Secp256k1<All>,
        mnemonic: &str,
        passphrase: &str,
    ) -> Result<Self, IdentityError> {
        let mnemonic = Mnemonic::parse_normalized(mnemonic)
            .map_err(|e| IdentityError::InvalidMnemonic(e.to_string()))?;
        let seed = Zeroizing::new(mnemonic.to_seed(passphrase));
        let master = Xpriv::new_master(NetworkKind::Test, &seed[..])
            .map_err(|e| IdentityError::DerivationFailed(e.to_string()))?;
        let fingerprint = master.fingerprint(secp);
        Ok(Self { master, fingerprint })
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub(crate) fn derive_priv(
        &self,
        secp: &Secp256k1<All>,
        path: &DerivationPath,
    ) -> Result<Xpriv, IdentityError> {
        self.master
            .derive_priv(secp, path)
            .map_err(|e| IdentityError::DerivationFailed(e.to_string()))
    }

    /// Extended public key at `path`, encoded for `network`.
    pub fn derive_pub(
        &self,
        secp: &Secp256k1<All>,
        path: &DerivationPath,
        network: impl Into<NetworkKind>,
    ) -> Result<Xpub, IdentityError> {
        let xpriv = self.derive_priv(secp, path)?;
        let mut xpub = Xpub::from_priv(secp, &xpriv);
        xpub.network = network.into();
        Ok(xpub)
    }
}

impl Drop for WalletIdentity {
    fn drop(&mut self) {
        self.master.private_key.non_secure_erase();
    }
}

impl std::fmt::Debug for WalletIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletIdentity")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}
