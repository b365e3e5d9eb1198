use ethers::prelude::abigen;

// Generates the bindings for the `BattleShipWithoutBoard` contract. The on-chain game and every
// off-chain mirror expose the same surface.
abigen!(
    BattleShipWithoutBoard,
    r"[
        function move_ctr() external view returns (uint256)
        function round() external view returns (uint256)
        function channelCounter() external view returns (uint256)
        function stateChannel() external view returns (address)
        function getState(uint256 _r) external view returns (bytes32 _h)
        function attack(uint8 x, uint8 y, bytes calldata signature) external
        function revealslot(bool b, bytes calldata signature) external
        function revealsunk(uint256 shipIndex, uint8 x1, uint8 y1, uint8 x2, uint8 y2, uint256 r, bytes calldata signature) external
        function lock(bytes[] calldata signatures) external
        function unlock(uint256 _r, bytes[] calldata signatures) external
    ]"
);
