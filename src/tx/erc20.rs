//! ERC-20 calldata for the three calls the engine needs

use crate::error::{EngineError, EngineResult};

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, U256};
use sha3::{Digest, Keccak256};

/// First four bytes of keccak256 over the function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

fn encode_call(signature: &str, args: &[Token]) -> Bytes {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&abi::encode(args));
    data.into()
}

/// `allowance(owner, spender)`
pub fn encode_allowance(owner: Address, spender: Address) -> Bytes {
    encode_call(
        "allowance(address,address)",
        &[Token::Address(owner), Token::Address(spender)],
    )
}

/// `approve(spender, amount)`
pub fn encode_approve(spender: Address, amount: U256) -> Bytes {
    encode_call(
        "approve(address,uint256)",
        &[Token::Address(spender), Token::Uint(amount)],
    )
}

/// `decimals()`
pub fn encode_decimals() -> Bytes {
    encode_call("decimals()", &[])
}

/// Decode a single `uint256` return value
pub fn decode_uint(output: &Bytes) -> EngineResult<U256> {
    abi::decode(&[ParamType::Uint(256)], output)
        .ok()
        .and_then(|mut tokens| tokens.pop())
        .and_then(Token::into_uint)
        .ok_or_else(|| {
            EngineError::Reverted(format!(
                "unexpected uint256 return data: 0x{}",
                hex::encode(output)
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_selectors() {
        assert_eq!(selector("approve(address,uint256)"), [0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(selector("allowance(address,address)"), [0xdd, 0x62, 0xed, 0x3e]);
        assert_eq!(selector("decimals()"), [0x31, 0x3c, 0xe5, 0x67]);
    }

    #[test]
    fn test_approve_layout() {
        let spender = Address::repeat_byte(0x11);
        let data = encode_approve(spender, U256::from(100));
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(&data[16..36], spender.as_bytes());
        assert_eq!(data[67], 100);
    }

    #[test]
    fn test_decode_uint_rejects_empty() {
        assert!(decode_uint(&Bytes::new()).is_err());
        let mut word = [0u8; 32];
        word[31] = 18;
        assert_eq!(decode_uint(&Bytes::from(word.to_vec())).unwrap(), U256::from(18));
    }
}
