//! Scripted fakes shared by the unit tests

use crate::chain::{ChainClient, GasPrice, TxReceipt, TxRequest};
use crate::error::{EngineError, EngineResult};
use crate::execution::{ExecutionOutcome, QuoteExecutor};
use crate::progress::Progress;
use crate::quotes::{Quote, QuoteRequest, QuoteSource, Slippage, TxPlan};
use crate::tx::erc20;

use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::types::{Address, Bytes, H256, U256};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn wallet() -> Address {
    Address::repeat_byte(0x11)
}

pub fn router() -> Address {
    Address::repeat_byte(0x22)
}

pub fn spender() -> Address {
    Address::repeat_byte(0x33)
}

pub fn token_in() -> Address {
    Address::repeat_byte(0xaa)
}

pub fn token_out() -> Address {
    Address::repeat_byte(0xbb)
}

/// Same-chain request on chain 1 selling 100 base units of `token_in`
pub fn quote_request() -> QuoteRequest {
    QuoteRequest {
        from_chain: 1,
        to_chain: 1,
        from_token: token_in(),
        to_token: token_out(),
        from_decimals: 18,
        to_decimals: 6,
        amount: U256::from(100),
        from_address: wallet(),
        to_address: wallet(),
    }
}

/// How the next receipt wait resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptScript {
    Success,
    Reverted,
    Timeout,
}

#[derive(Default)]
struct ChainState {
    decimals: HashMap<Address, u8>,
    allowances: HashMap<(Address, Address), U256>,
    pending_approvals: HashMap<H256, (Address, Address, U256)>,
    sent: Vec<(u64, TxRequest)>,
    receipts: VecDeque<ReceiptScript>,
    send_failures: VecDeque<EngineError>,
    allowance_reads: usize,
}

/// In-memory chain: ERC-20 reads, recorded sends and scripted receipts
#[derive(Default)]
pub struct FakeChain {
    state: Mutex<ChainState>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_decimals(&self, token: Address, decimals: u8) {
        self.state.lock().unwrap().decimals.insert(token, decimals);
    }

    pub fn set_allowance(&self, token: Address, spender: Address, amount: U256) {
        self.state
            .lock()
            .unwrap()
            .allowances
            .insert((token, spender), amount);
    }

    /// Receipts returned in order; unscripted waits succeed
    pub fn script_receipts(&self, receipts: impl IntoIterator<Item = ReceiptScript>) {
        self.state.lock().unwrap().receipts.extend(receipts);
    }

    /// The next sends reach the chain but report these errors to the caller
    pub fn fail_sends_after_broadcast(&self, errors: impl IntoIterator<Item = EngineError>) {
        self.state.lock().unwrap().send_failures.extend(errors);
    }

    pub fn sent(&self) -> Vec<TxRequest> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|(_, tx)| tx.clone())
            .collect()
    }

    /// `(token, spender, amount)` of every approval sent
    pub fn approvals(&self) -> Vec<(Address, Address, U256)> {
        self.sent()
            .iter()
            .filter_map(|tx| decode_approve(tx).map(|(spender, amount)| (tx.to, spender, amount)))
            .collect()
    }

    pub fn allowance_reads(&self) -> usize {
        self.state.lock().unwrap().allowance_reads
    }
}

fn has_selector(data: &Bytes, signature: &str) -> bool {
    data.len() >= 4 && data[..4] == erc20::selector(signature)
}

fn decode_approve(tx: &TxRequest) -> Option<(Address, U256)> {
    if !has_selector(&tx.data, "approve(address,uint256)") || tx.data.len() < 68 {
        return None;
    }
    let spender = Address::from_slice(&tx.data[16..36]);
    let amount = U256::from_big_endian(&tx.data[36..68]);
    Some((spender, amount))
}

#[async_trait]
impl ChainClient for FakeChain {
    fn address(&self) -> Address {
        wallet()
    }

    async fn call(&self, _chain_id: u64, to: Address, data: Bytes) -> EngineResult<Bytes> {
        let mut state = self.state.lock().unwrap();
        if has_selector(&data, "decimals()") {
            return match state.decimals.get(&to) {
                Some(decimals) => Ok(abi::encode(&[Token::Uint(U256::from(*decimals))]).into()),
                None => Err(EngineError::Reverted("execution reverted".into())),
            };
        }
        if has_selector(&data, "allowance(address,address)") && data.len() >= 68 {
            state.allowance_reads += 1;
            let spender = Address::from_slice(&data[48..68]);
            let allowance = state
                .allowances
                .get(&(to, spender))
                .copied()
                .unwrap_or_default();
            return Ok(abi::encode(&[Token::Uint(allowance)]).into());
        }
        Err(EngineError::Reverted("execution reverted".into()))
    }

    async fn estimate_gas(&self, _chain_id: u64, _tx: &TxRequest) -> EngineResult<U256> {
        Ok(U256::from(100_000))
    }

    async fn gas_price(&self, _chain_id: u64) -> EngineResult<GasPrice> {
        Ok(GasPrice::Legacy(U256::from(1_000_000_000u64)))
    }

    async fn send_transaction(&self, chain_id: u64, tx: TxRequest) -> EngineResult<H256> {
        let mut state = self.state.lock().unwrap();
        let tx_hash = H256::from_low_u64_be(state.sent.len() as u64 + 1);
        if let Some((spender, amount)) = decode_approve(&tx) {
            state
                .pending_approvals
                .insert(tx_hash, (tx.to, spender, amount));
        }
        state.sent.push((chain_id, tx));
        match state.send_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(tx_hash),
        }
    }

    async fn wait_for_receipt(
        &self,
        chain_id: u64,
        tx_hash: H256,
        _timeout: Duration,
    ) -> EngineResult<TxReceipt> {
        let mut state = self.state.lock().unwrap();
        let script = state
            .receipts
            .pop_front()
            .unwrap_or(ReceiptScript::Success);
        let approval = state.pending_approvals.remove(&tx_hash);

        match script {
            ReceiptScript::Timeout => Err(EngineError::ReceiptTimeout {
                chain_id,
                tx_hash: format!("{:?}", tx_hash),
            }),
            ReceiptScript::Reverted | ReceiptScript::Success => {
                let success = script == ReceiptScript::Success;
                if let (true, Some((token, spender, amount))) = (success, approval) {
                    state.allowances.insert((token, spender), amount);
                }
                Ok(TxReceipt {
                    tx_hash,
                    success,
                    block_number: Some(1),
                    gas_used: Some(U256::from(90_000)),
                })
            }
        }
    }
}

/// Quote source returning a fixed output
pub struct FakeSource {
    id: String,
    output: u64,
    fail_quotes: bool,
    min_bps: u32,
    delay: Option<Duration>,
    cross_chain: bool,
    broken_route: bool,
    quote_calls: AtomicU32,
}

impl FakeSource {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            output: 1_000,
            fail_quotes: false,
            min_bps: 0,
            delay: None,
            cross_chain: false,
            broken_route: false,
            quote_calls: AtomicU32::new(0),
        }
    }

    pub fn with_output(mut self, output: u64) -> Self {
        self.output = output;
        self
    }

    pub fn failing_quotes(mut self) -> Self {
        self.fail_quotes = true;
        self
    }

    /// No route at slippage bounds tighter than `bps`
    pub fn no_route_below(mut self, bps: u32) -> Self {
        self.min_bps = bps;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Also quote cross-chain requests
    pub fn cross_chain(mut self) -> Self {
        self.cross_chain = true;
        self
    }

    /// Quotes fine but cannot build a transaction from its own route
    pub fn broken_route(mut self) -> Self {
        self.broken_route = true;
        self
    }

    pub fn quote_calls(&self) -> u32 {
        self.quote_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteSource for FakeSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports(&self, request: &QuoteRequest) -> bool {
        self.cross_chain || !request.is_cross_chain()
    }

    async fn quote(&self, _request: &QuoteRequest, slippage: Slippage) -> EngineResult<Quote> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_quotes || slippage.bps() < self.min_bps {
            return Err(EngineError::Http {
                source_id: self.id.clone(),
                message: "no route".into(),
            });
        }
        Ok(Quote {
            source_id: self.id.clone(),
            min_output_amount: U256::from(self.output),
            slippage,
            raw_route: json!({ "source": self.id }),
        })
    }

    async fn build_transaction(&self, _quote: &Quote, _request: &QuoteRequest) -> EngineResult<TxPlan> {
        if self.broken_route {
            return Err(EngineError::Internal(format!(
                "malformed {} route: missing field `tool`",
                self.id
            )));
        }
        Ok(TxPlan {
            tx: TxRequest::new(router(), Bytes::from(vec![0x12, 0x34]), U256::zero()),
            spender: spender(),
            tool: Some(self.id.clone()),
            steps: vec![self.id.clone()],
        })
    }
}

/// Executor replaying scripted results, recording `(source, slippage bps)` per call
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<EngineResult<()>>>,
    fallback: Option<EngineError>,
    calls: Mutex<Vec<(String, u32)>>,
}

impl ScriptedExecutor {
    /// Unscripted calls succeed
    pub fn new(script: Vec<EngineResult<()>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always_failing(error: EngineError) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(error),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuoteExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        quote: &Quote,
        source: &dyn QuoteSource,
        request: &QuoteRequest,
        _progress: &Progress,
    ) -> ExecutionOutcome {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((quote.source_id.clone(), quote.slippage.bps()));
            calls.len() as u64
        };
        let scripted = self.script.lock().unwrap().pop_front();
        let result = match (scripted, &self.fallback) {
            (Some(result), _) => result,
            (None, Some(error)) => Err(error.clone()),
            (None, None) => Ok(()),
        };

        match result {
            Ok(()) => match source.build_transaction(quote, request).await {
                Ok(plan) => ExecutionOutcome::succeeded(H256::from_low_u64_be(call_number), plan),
                Err(e) => ExecutionOutcome::failed(e),
            },
            Err(e) => ExecutionOutcome::failed(e),
        }
    }
}
