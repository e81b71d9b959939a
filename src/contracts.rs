//! Contract ABIs
//!
//! Only the functions the orchestration calls are declared.

use alloy::sol;

sol! {
    /// Lend pool addresses provider registry
    #[derive(Debug)]
    #[sol(rpc)]
    contract ILendPoolAddressesProviderRegistry {
        function getAddressesProvidersList() external view returns (address[] memory);
        function registerAddressesProvider(address provider, uint256 id) external;
    }

    /// Per-market addresses provider
    #[derive(Debug)]
    #[sol(rpc)]
    contract ILendPoolAddressesProvider {
        function getMarketId() external view returns (string memory);
        function getPoolAdmin() external view returns (address);
        function getEmergencyAdmin() external view returns (address);
        function getLendPool() external view returns (address);
        function getLendPoolLoan() external view returns (address);
        function getLendPoolConfigurator() external view returns (address);
        function getLendPoolLiquidator() external view returns (address);
        function getReserveOracle() external view returns (address);
        function getNFTOracle() external view returns (address);
        function getBNFTRegistry() external view returns (address);
        function getIncentivesController() external view returns (address);
        function getBendDataProvider() external view returns (address);
        function getUIDataProvider() external view returns (address);
        function getWalletBalanceProvider() external view returns (address);

        function setPoolAdmin(address admin) external;
        function setEmergencyAdmin(address admin) external;
        function setBNFTRegistry(address factory) external;
        function setIncentivesController(address controller) external;
        function setLendPoolImpl(address pool, bytes memory encodedCallData) external;
    }

    /// Protocol data provider
    #[derive(Debug)]
    #[sol(rpc)]
    contract IBendProtocolDataProvider {
        struct ReserveTokenData {
            string tokenSymbol;
            address tokenAddress;
            string bTokenSymbol;
            address bTokenAddress;
            string debtTokenSymbol;
            address debtTokenAddress;
        }

        struct NftTokenData {
            string nftSymbol;
            address nftAddress;
            string bNftSymbol;
            address bNftAddress;
        }

        function getReserveConfigurationData(address asset) external view returns (
            uint256 decimals,
            uint256 reserveFactor,
            bool borrowingEnabled,
            bool isActive,
            bool isFrozen
        );

        function getReserveTokenData(address asset) external view returns (ReserveTokenData memory);

        function getNftConfigurationData(address asset) external view returns (
            uint256 ltv,
            uint256 liquidationThreshold,
            uint256 liquidationBonus,
            uint256 redeemDuration,
            uint256 auctionDuration,
            uint256 redeemFine,
            bool isActive,
            bool isFrozen
        );

        function getNftTokenData(address nftAsset) external view returns (NftTokenData memory);
    }

    #[derive(Debug)]
    #[sol(rpc)]
    contract ILendPool {
        function MAX_NUMBER_RESERVES() external view returns (uint256);
        function MAX_NUMBER_NFTS() external view returns (uint256);
        function paused() external view returns (bool);
    }

    /// BNFT registry (behind an upgradeable proxy)
    #[derive(Debug)]
    #[sol(rpc)]
    contract IBNFTRegistry {
        function initialize(address genericImpl, string memory namePrefix_, string memory symbolPrefix_) external;
        function transferOwnership(address newOwner) external;
    }
}
