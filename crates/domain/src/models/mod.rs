//! Domain models for the storefront commerce core.

pub mod booking;
pub mod cart;
pub mod oauth_token;
pub mod order;
pub mod product;
pub mod remote;

pub use booking::{
    AvailabilityQuery, AvailabilitySlot, Booking, CreateBookingRequest, NewBooking, Service,
    SlotSegment,
};
pub use cart::{
    AddCartItemRequest, Cart, CartItem, CartLine, CartOwner, CartView, NewCart,
    UpdateCartItemRequest,
};
pub use oauth_token::{ConnectionStatus, StoredToken, TokenSource};
pub use order::{CheckoutReceipt, CheckoutRequest, NewOrder, NewOrderItem, Order, OrderItem};
pub use product::{Product, SyncReport, SyncedProductUpdate};
