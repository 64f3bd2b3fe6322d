pub mod carts;
pub mod checkout;
pub mod notifications;
pub mod products;
pub mod wishlists;

pub use carts::{AddItemInput, CartDetail, CartLine, CartService};
pub use checkout::{
    CheckoutDetail, CheckoutService, InitiateCheckoutInput, InitializedCheckout,
};
pub use notifications::{LogNotifier, Notifier};
pub use products::{CreateProductInput, ProductService, UpdateProductInput};
pub use wishlists::{WishlistService, WishlistToggle};
