/// Persistence entities
pub mod cart;
pub mod cart_item;
pub mod checkout;
pub mod checkout_item;
pub mod product;
pub mod user;
pub mod wishlist_item;

// Re-export entities
pub use cart::{Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use checkout::{CheckoutStatus, Entity as Checkout, Model as CheckoutModel};
pub use checkout_item::{Entity as CheckoutItem, Model as CheckoutItemModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use user::{Entity as User, Model as UserModel};
pub use wishlist_item::{Entity as WishlistItem, Model as WishlistItemModel};
