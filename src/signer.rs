//! Minimal common signer capability.
//!
//! EVM and Solana signers expose very different native APIs. Rather than forcing them behind a
//! shared base trait that leaks one engine's shape into the other, the core only asks signers for
//! the handful of operations every fulfillment/unlock actually needs; everything engine-specific
//! (gas estimation, instruction building) lives on [`crate::executor::ChainEngine`] instead.

use std::fmt;

use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer as SolanaSignerTrait};
use tracing::Span;

/// An account identity on either engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountId {
    Evm(Address),
    Solana(Pubkey),
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountId::Evm(address) => write!(f, "{address}"),
            AccountId::Solana(pubkey) => write!(f, "{pubkey}"),
        }
    }
}

/// A token identity on either engine: an EVM ERC-20 address, or a Solana mint. The native asset is
/// represented by each engine's conventional zero/sentinel address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenId {
    Evm(Address),
    Solana(Pubkey),
}

/// A signed, broadcastable payload. Opaque to the core — the concrete chain client knows how to
/// decode and submit it.
#[derive(Debug, Clone)]
pub struct SignedPayload(pub Vec<u8>);

/// An opaque on-chain transaction/signature hash, used to key wait-for-confirmation polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", alloy::hex::encode(self.0))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("transient signer/RPC error: {0}")]
    Transient(String),
    #[error("signer rejected transaction: {0}")]
    Rejected(String),
}

/// The capability set every chain signer exposes to the pipeline, independent of engine.
#[async_trait]
pub trait ChainSigner: Send + Sync + fmt::Debug {
    /// This signer's own account identity.
    fn address(&self) -> AccountId;

    /// Current balance of `token` held by this signer.
    async fn get_balance(&self, token: TokenId) -> Result<U256, SignerError>;

    /// Sign and broadcast `payload`, returning the resulting transaction hash.
    ///
    /// `logger` is the caller's per-order tracing span, entered for the duration of the call so
    /// any internal retry/backoff logging nests under it.
    async fn send_transaction(
        &self,
        payload: SignedPayload,
        logger: &Span,
    ) -> Result<TxHash, SignerError>;
}

/// ERC-20 `balanceOf(address)` selector, keccak256("balanceOf(address)")[..4].
const ERC20_BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// EVM [`ChainSigner`] backed by a plain HTTP JSON-RPC provider, keyed by a hex-encoded private
/// key. `build_payload`/calldata assembly stays with the injected
/// [`crate::executor::evm::EvmChainClient`]; this type only broadcasts the already-built payload
/// and answers balance queries, mirroring `signet-filler`'s `initialization::connect_signer`.
#[derive(Debug)]
pub struct AlloyEvmSigner {
    address: Address,
    provider: DynProvider,
}

impl AlloyEvmSigner {
    pub fn new(chain_rpc: &str, private_key_hex: &str) -> Result<Self, SignerError> {
        let signer: PrivateKeySigner = private_key_hex
            .parse()
            .map_err(|e| SignerError::Rejected(format!("invalid EVM private key: {e}")))?;
        let url = chain_rpc
            .parse()
            .map_err(|e| SignerError::Rejected(format!("invalid chain_rpc url: {e}")))?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        Ok(Self { address: signer.address(), provider })
    }
}

#[async_trait]
impl ChainSigner for AlloyEvmSigner {
    fn address(&self) -> AccountId {
        AccountId::Evm(self.address)
    }

    async fn get_balance(&self, token: TokenId) -> Result<U256, SignerError> {
        let TokenId::Evm(token_addr) = token else {
            return Err(SignerError::Rejected("EVM signer received a non-EVM token id".into()));
        };
        if token_addr.is_zero() {
            return self
                .provider
                .get_balance(self.address)
                .await
                .map_err(|e| SignerError::Transient(e.to_string()));
        }

        let mut calldata = ERC20_BALANCE_OF_SELECTOR.to_vec();
        calldata.extend_from_slice(&[0u8; 12]);
        calldata.extend_from_slice(self.address.as_slice());
        let tx = TransactionRequest::default().to(token_addr).input(Bytes::from(calldata).into());
        let result =
            self.provider.call(tx).await.map_err(|e| SignerError::Transient(e.to_string()))?;
        Ok(U256::from_be_slice(&result))
    }

    async fn send_transaction(
        &self,
        payload: SignedPayload,
        _logger: &Span,
    ) -> Result<TxHash, SignerError> {
        let pending = self
            .provider
            .send_raw_transaction(&payload.0)
            .await
            .map_err(|e| SignerError::Transient(e.to_string()))?;
        Ok(TxHash(pending.tx_hash().0))
    }
}

/// Solana [`ChainSigner`] speaking plain JSON-RPC over `reqwest`, keyed by a base58-encoded
/// private key. No `solana-client` dependency is added for this — the pack's stack has no Solana
/// RPC client crate, so this follows the same "plain `reqwest` JSON body" style
/// `init4tech-signet-filler`'s `TxCache` client uses for its own bespoke HTTP API.
///
/// `get_balance` answers with the lamport (native) balance regardless of `token`: deriving an SPL
/// associated token account's balance requires the same calldata-formatting machinery the
/// fulfill/unlock wrappers handle, so it isn't built here either.
#[derive(Debug)]
pub struct JsonRpcSolanaSigner {
    pubkey: Pubkey,
    rpc_url: String,
    client: reqwest::Client,
}

impl JsonRpcSolanaSigner {
    pub fn new(rpc_url: &str, keypair: &Keypair) -> Self {
        Self {
            pubkey: keypair.pubkey(),
            rpc_url: rpc_url.to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn rpc_call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, SignerError> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let response = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SignerError::Transient(e.to_string()))?
            .error_for_status()
            .map_err(|e| SignerError::Transient(e.to_string()))?;
        let parsed: serde_json::Value =
            response.json().await.map_err(|e| SignerError::Transient(e.to_string()))?;
        if let Some(error) = parsed.get("error") {
            return Err(SignerError::Rejected(error.to_string()));
        }
        parsed
            .get("result")
            .cloned()
            .ok_or_else(|| SignerError::Transient("missing result field in RPC response".into()))
    }
}

#[async_trait]
impl ChainSigner for JsonRpcSolanaSigner {
    fn address(&self) -> AccountId {
        AccountId::Solana(self.pubkey)
    }

    async fn get_balance(&self, _token: TokenId) -> Result<U256, SignerError> {
        let result = self.rpc_call("getBalance", json!([self.pubkey.to_string()])).await?;
        let lamports = result
            .get("value")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| SignerError::Transient("malformed getBalance response".into()))?;
        Ok(U256::from(lamports))
    }

    async fn send_transaction(
        &self,
        payload: SignedPayload,
        _logger: &Span,
    ) -> Result<TxHash, SignerError> {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&payload.0);
        let result = self
            .rpc_call("sendTransaction", json!([encoded, { "encoding": "base64" }]))
            .await?;
        let signature = result
            .as_str()
            .ok_or_else(|| SignerError::Transient("malformed sendTransaction response".into()))?;
        let bytes = bs58::decode(signature)
            .into_vec()
            .map_err(|e| SignerError::Transient(format!("invalid signature encoding: {e}")))?;
        let mut hash = [0u8; 32];
        let len = bytes.len().min(32);
        hash[..len].copy_from_slice(&bytes[..len]);
        Ok(TxHash(hash))
    }
}
