//! Role-based channel selection and subscription setup.

mod channels;
mod manager;

pub use channels::{
    channels_for, common_channels, role_channels, ChannelDescriptor, ChannelSubscription, Role,
};
pub use manager::SubscriptionManager;
