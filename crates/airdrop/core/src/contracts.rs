use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};

use crate::types::Airdrop;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    contract IAirdropper {
        function multisend(
            address tokenAddr,
            address[] calldata dests,
            uint256[] calldata values
        ) external returns (uint256);
    }

    #[derive(Debug, PartialEq, Eq)]
    contract IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);

        function balanceOf(address account) external view returns (uint256);
    }
}

/// ABI encodes a `multisend` of `batch` paid out in `token`.
pub fn encode_multisend(token: Address, batch: &[Airdrop]) -> Bytes {
    let (dests, values): (Vec<Address>, Vec<U256>) = batch
        .iter()
        .map(|airdrop| (airdrop.address, airdrop.amount))
        .unzip();

    IAirdropper::multisendCall {
        tokenAddr: token,
        dests,
        values,
    }
    .abi_encode()
    .into()
}
