// ============================================================================
// BASE IMAGE LOADER — tokenURI contract call → metadata JSON → artwork
// ============================================================================
//
// The chain and the HTTP fetch sit behind traits so the pipeline can be
// exercised against mocks. The real implementations use a JSON-RPC `eth_call`
// and a blocking `ureq` agent with bounded timeouts; a timeout cancels the
// in-flight request and surfaces as `NetworkError::Timeout`, distinct from
// other transport failures.

use std::io::Read;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ChainError, NetworkError, SignError, from_ureq};
use crate::signs::Collection;
use crate::surface::Raster;

/// HTTPS gateway used to rewrite `ipfs://` URIs before fetching.
pub const IPFS_GATEWAY: &str = "https://ipfs.io/ipfs/";

/// 4-byte selector of `tokenURI(uint256)`.
const TOKEN_URI_SELECTOR: &str = "c87b56dd";

/// Per-request network budget. Metadata and image fetches that exceed it are
/// cancelled rather than waited on indefinitely.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
//  Collaborator boundaries
// ---------------------------------------------------------------------------

/// Read-only token metadata source (the on-chain contract).
pub trait TokenSource {
    fn token_uri(&self, collection: Collection, token_id: u64) -> Result<String, SignError>;
}

/// Fetches metadata documents and image bytes over the network.
pub trait RemoteFetcher {
    fn fetch_metadata(&self, url: &str) -> Result<TokenMetadata, SignError>;
    fn fetch_image(&self, url: &str) -> Result<Raster, SignError>;
}

// ---------------------------------------------------------------------------
//  Metadata document
// ---------------------------------------------------------------------------

/// The fetched metadata JSON. Collections disagree on the image field name,
/// so all three spellings are accepted.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TokenMetadata {
    pub image: Option<String>,
    pub image_url: Option<String>,
    #[serde(rename = "imageUrl")]
    pub image_url_camel: Option<String>,
}

impl TokenMetadata {
    /// First present of `image`, `image_url`, `imageUrl`.
    pub fn image_source(&self) -> Option<&str> {
        self.image
            .as_deref()
            .or(self.image_url.as_deref())
            .or(self.image_url_camel.as_deref())
    }
}

/// Rewrite an `ipfs://` URI to its HTTPS gateway form; anything else passes
/// through untouched.
pub fn resolve_ipfs(uri: &str) -> String {
    match uri.strip_prefix("ipfs://") {
        Some(rest) => format!("{}{}", IPFS_GATEWAY, rest.trim_start_matches("ipfs/")),
        None => uri.to_string(),
    }
}

// ---------------------------------------------------------------------------
//  JSON-RPC token source
// ---------------------------------------------------------------------------

/// `tokenURI(uint256)` via `eth_call` against the collection's contract.
pub struct RpcTokenSource {
    agent: ureq::Agent,
    endpoint: String,
}

impl RpcTokenSource {
    pub fn new(endpoint: &str) -> Self {
        RpcTokenSource {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            endpoint: endpoint.to_string(),
        }
    }
}

impl TokenSource for RpcTokenSource {
    fn token_uri(&self, collection: Collection, token_id: u64) -> Result<String, SignError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                {
                    "to": collection.contract_address(),
                    "data": encode_token_uri_call(token_id),
                },
                "latest"
            ]
        });

        let response = self
            .agent
            .post(&self.endpoint)
            .send_json(body)
            .map_err(|e| from_ureq(e, &self.endpoint))?;
        let doc: serde_json::Value = response
            .into_json()
            .map_err(|e| SignError::Network(NetworkError::Io(e.to_string())))?;

        if let Some(err) = doc.get("error") {
            let msg = err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown RPC error");
            // ERC-721 reverts tokenURI for nonexistent ids
            if msg.contains("revert") || msg.contains("nonexistent") {
                return Err(ChainError::TokenMissing {
                    collection: collection.id().to_string(),
                    token_id,
                }
                .into());
            }
            return Err(ChainError::Rpc(msg.to_string()).into());
        }

        let result = doc
            .get("result")
            .and_then(|r| r.as_str())
            .ok_or_else(|| ChainError::Rpc("eth_call returned no result".into()))?;
        // Empty return data is the other shape a reverted call takes
        if result == "0x" {
            return Err(ChainError::TokenMissing {
                collection: collection.id().to_string(),
                token_id,
            }
            .into());
        }
        decode_abi_string(result)
    }
}

/// ABI-encode the `tokenURI(uint256)` calldata for `token_id`.
pub fn encode_token_uri_call(token_id: u64) -> String {
    format!("0x{}{:064x}", TOKEN_URI_SELECTOR, token_id)
}

/// Decode a single ABI-encoded `string` return value
/// (32-byte offset, 32-byte length, UTF-8 bytes).
pub fn decode_abi_string(hex: &str) -> Result<String, SignError> {
    let bytes = decode_hex(hex.trim_start_matches("0x"))
        .ok_or_else(|| ChainError::Rpc("malformed eth_call return data".into()))?;
    if bytes.len() < 64 {
        return Err(ChainError::Rpc("eth_call return data too short".into()).into());
    }
    let offset = be_word(&bytes[0..32])
        .ok_or_else(|| ChainError::Rpc("string offset out of range".into()))?;
    let len_start = offset
        .checked_add(32)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| ChainError::Rpc("string offset out of range".into()))?;
    let len = be_word(&bytes[offset..len_start])
        .ok_or_else(|| ChainError::Rpc("string length out of range".into()))?;
    let data_end = len_start
        .checked_add(len)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| ChainError::Rpc("string length out of range".into()))?;
    String::from_utf8(bytes[len_start..data_end].to_vec())
        .map_err(|_| ChainError::Rpc("tokenURI is not valid UTF-8".into()).into())
}

/// Big-endian 32-byte word → usize, `None` if it exceeds usize range.
fn be_word(word: &[u8]) -> Option<usize> {
    if word[..24].iter().any(|&b| b != 0) {
        return None;
    }
    let mut v: u64 = 0;
    for &b in &word[24..32] {
        v = (v << 8) | b as u64;
    }
    usize::try_from(v).ok()
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

// ---------------------------------------------------------------------------
//  HTTP fetcher
// ---------------------------------------------------------------------------

/// Blocking HTTP fetcher with bounded timeouts. Image responses carrying a
/// CORS approval header decode to clean rasters; everything else is marked
/// cross-origin and will taint any surface it is drawn onto.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new() -> Self {
        HttpFetcher {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
        }
    }

    /// Fetch a plain-text document (the sign catalog).
    pub fn fetch_text(&self, url: &str) -> Result<String, SignError> {
        let response = self.agent.get(url).call().map_err(|e| from_ureq(e, url))?;
        response
            .into_string()
            .map_err(|e| SignError::Network(NetworkError::Io(e.to_string())))
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        HttpFetcher::new()
    }
}

impl RemoteFetcher for HttpFetcher {
    fn fetch_metadata(&self, url: &str) -> Result<TokenMetadata, SignError> {
        let response = self.agent.get(url).call().map_err(|e| from_ureq(e, url))?;
        response
            .into_json::<TokenMetadata>()
            .map_err(|e| SignError::Network(NetworkError::Io(e.to_string())))
    }

    fn fetch_image(&self, url: &str) -> Result<Raster, SignError> {
        let response = self.agent.get(url).call().map_err(|e| from_ureq(e, url))?;
        let cors_approved = response.header("access-control-allow-origin").is_some();

        let mut bytes: Vec<u8> = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| SignError::Network(NetworkError::Io(e.to_string())))?;

        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| SignError::Decode(format!("{}: {}", url, e)))?
            .into_rgba8();

        Ok(if cors_approved {
            Raster::clean(decoded)
        } else {
            Raster::cross_origin(decoded)
        })
    }
}

// ---------------------------------------------------------------------------
//  Load pipeline
// ---------------------------------------------------------------------------

/// A successfully loaded token: the decoded artwork plus its identity.
#[derive(Clone, Debug)]
pub struct LoadedToken {
    pub collection: Collection,
    pub token_id: u64,
    pub raster: Raster,
}

/// Full load: contract call → metadata fetch → image resolve/fetch/decode.
pub fn load_token(
    chain: &dyn TokenSource,
    fetcher: &dyn RemoteFetcher,
    collection: Collection,
    token_id: u64,
) -> Result<LoadedToken, SignError> {
    let uri = chain.token_uri(collection, token_id)?;
    let metadata_url = resolve_ipfs(&uri);
    let metadata = fetcher.fetch_metadata(&metadata_url)?;

    let image_uri = metadata.image_source().ok_or_else(|| {
        SignError::Validation(format!(
            "metadata for {} #{} has no image field",
            collection.id(),
            token_id
        ))
    })?;
    let image_url = resolve_ipfs(image_uri);
    let raster = fetcher.fetch_image(&image_url)?;

    crate::log_info!(
        "loaded {} #{}: {}×{} px from {}",
        collection.id(),
        token_id,
        raster.width(),
        raster.height(),
        image_url
    );
    Ok(LoadedToken {
        collection,
        token_id,
        raster,
    })
}

/// Generation counter for a load slot: when loads can be superseded, only the
/// most recent one may commit its result.
#[derive(Default)]
pub struct LoadSlot {
    generation: u64,
}

impl LoadSlot {
    pub fn new() -> Self {
        LoadSlot::default()
    }

    /// Start a new load, superseding all earlier ones. Returns its generation.
    pub fn begin(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Whether the load with `generation` is still the most recent.
    pub fn may_commit(&self, generation: u64) -> bool {
        generation == self.generation
    }
}
