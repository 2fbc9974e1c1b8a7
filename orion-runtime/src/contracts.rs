//! Solidity bindings for the Orion protocol contracts.
//!
//! Uses alloy's `sol!` macro to generate type-safe ABI encoders/decoders
//! for the config registry, vault factory and transparent vaults.

use alloy::sol;

sol! {
    /// Protocol-wide registry of assets, managers, factories and vaults.
    #[sol(rpc)]
    interface IOrionConfig {
        function isSystemIdle() external view returns (bool);
        function isWhitelistedManager(address manager) external view returns (bool);
        function isWhitelisted(address token) external view returns (bool);
        function strategistIntentDecimals() external view returns (uint8);
        function getAllWhitelistedAssets() external view returns (address[] memory);
        function transparentVaultFactory() external view returns (address);
        function getAllOrionVaults(uint8 vaultType) external view returns (address[] memory);
    }

    #[sol(rpc)]
    interface ITransparentVaultFactory {
        event OrionVaultCreated(
            address indexed vault,
            address indexed manager,
            address indexed strategist,
            string name,
            string symbol,
            uint8 feeType,
            uint16 performanceFee,
            uint16 managementFee,
            address depositAccessControl
        );

        function createVault(
            address strategist,
            string calldata name,
            string calldata symbol,
            uint8 feeType,
            uint16 performanceFee,
            uint16 managementFee,
            address depositAccessControl
        ) external returns (address vault);
    }

    #[sol(rpc)]
    interface IOrionTransparentVault {
        struct FeeModel {
            uint8 feeType;
            uint16 performanceFee;
            uint16 managementFee;
            uint256 highWaterMark;
        }

        #[derive(Debug)]
        struct IntentToken {
            address token;
            uint32 weight;
        }

        function manager() external view returns (address);
        function strategist() external view returns (address);
        function activeFeeModel() external view returns (FeeModel memory);
        function MAX_PERFORMANCE_FEE() external view returns (uint16);
        function MAX_MANAGEMENT_FEE() external view returns (uint16);
        function isDecommissioning() external view returns (bool);
        function depositAccessControl() external view returns (address);

        function submitIntent(IntentToken[] calldata intent) external;
        function updateStrategist(address newStrategist) external;
        function updateFeeModel(uint8 feeType, uint16 performanceFee, uint16 managementFee) external;
        function setDepositAccessControl(address accessControl) external;
    }

    // Custom errors raised by the protocol contracts.
    error NotAuthorized();
    error SystemNotIdle();
    error InvalidArguments();
    error AlreadyRegistered();
    error ZeroAddress();
}

/// `getAllOrionVaults` selector value for transparent vaults.
pub const TRANSPARENT_VAULT_KIND: u8 = 0;
