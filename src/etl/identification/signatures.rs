//! Function selectors and event signature hashes used for identification.

/// `keccak256` of well-known event signatures (`topic0`).
pub mod topics {
    pub const TRANSFER: &str =
        "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
    pub const APPROVAL: &str =
        "0x8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925";
    pub const TRANSFER_SINGLE: &str =
        "0xc3d58168c5ae7397731d063d5bbf3d657854427343f4c083240f7aacaa2d0f62";
    pub const TRANSFER_BATCH: &str =
        "0x4a39dc06d4c0dbc64b70af90fd698a233a518aa5d07e595d983b8c0526c8f7fb";
    pub const SWAP: &str = "0xd78ad95fa46c994b6551d0da85fc275fe613ce37657fb8d5e3d130840159d822";
    pub const SYNC: &str = "0x1c411e9a96e071241c2f21f7726b17ae89e3cab4c78be50e062b03a9fffbbad1";
    pub const MINT: &str = "0x4c209b5fc8ad50758f13e2e1088ba56a560dff690a1c6fef26394f4c03821c4f";
    pub const BURN: &str = "0xdccd412f0b1252819cb1fd330b93224ca42612892bb3f4f789976e6d81936496";
    pub const DEPOSIT: &str =
        "0xe1fffcc4923d04b559f4d29a8bfc6cda04eb5b0d3c460751c2402c5c5cc9109c";
    pub const WITHDRAW: &str =
        "0x884edad9ce6fa2440d8a54cc123490eb96d2768479d49ff9c7366125a9424364";
    pub const STAKE: &str = "0x9e71bc8eea02a63969f509818f2dafb9254532904319f9dbda79b67bd34a5f3d";
    pub const PROPOSAL_CREATED: &str =
        "0x7d84a6263ae0d98d3329bd7b46bb4e8d6f98cd35a7adb45c274c8b7fd5ebd5e0";
    pub const VOTE_CAST: &str =
        "0xb8e138887d0aa13bab447e82de9d5c1777041ecd21ca36ba824ff1e6c07ddda4";
}

/// 4-byte function selectors of the token standards.
pub mod selectors {
    /// balanceOf, allowance, transfer, approve, transferFrom
    pub const ERC20: [[u8; 4]; 5] = [
        [0x70, 0xa0, 0x82, 0x31],
        [0xdd, 0x62, 0xed, 0x3e],
        [0xa9, 0x05, 0x9c, 0xbb],
        [0x09, 0x5e, 0xa7, 0xb3],
        [0x23, 0xb8, 0x72, 0xdd],
    ];

    /// ownerOf, safeTransferFrom (both overloads), getApproved, isApprovedForAll
    pub const ERC721: [[u8; 4]; 5] = [
        [0x63, 0x52, 0x21, 0x1e],
        [0x42, 0x84, 0x2e, 0x0e],
        [0xb8, 0x8d, 0x4f, 0xde],
        [0x08, 0x18, 0x12, 0xfc],
        [0xe9, 0x85, 0xe9, 0xc5],
    ];

    /// balanceOf(address,uint256), balanceOfBatch, safeTransferFrom, safeBatchTransferFrom
    pub const ERC1155: [[u8; 4]; 4] = [
        [0x00, 0xfd, 0xd5, 0x8e],
        [0x4e, 0x12, 0x73, 0xf4],
        [0xf2, 0x42, 0x43, 0x2a],
        [0x2e, 0xb2, 0xc2, 0xd6],
    ];
}

/// Number of distinct `selectors` found at any byte offset of `code`.
pub fn count_selectors(code: &[u8], selectors: &[[u8; 4]]) -> usize {
    selectors
        .iter()
        .filter(|selector| code.windows(4).any(|w| w == selector.as_slice()))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_selectors_on_byte_boundaries() {
        // PUSH4 balanceOf ... PUSH4 transfer, with a shifted copy of approve
        let code = [
            0x63, 0x70, 0xa0, 0x82, 0x31, 0x14, 0x63, 0xa9, 0x05, 0x9c, 0xbb, 0x00, 0x09, 0x5e,
            0xa7,
        ];
        assert_eq!(count_selectors(&code, &selectors::ERC20), 2);
        assert_eq!(count_selectors(&[], &selectors::ERC20), 0);
    }
}
