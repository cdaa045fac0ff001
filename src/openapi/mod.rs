use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Pharmacy Order API",
        version = "0.1.0",
        description = r#"
# Pharmacy Order API

Order lifecycle of a multi-vendor pharmacy marketplace.

## Flow

1. `POST /cart/checkout` freezes the selected cart lines into a snapshot grouped by pharmacy.
2. `POST /orders` turns the snapshot into one order with one order detail per pharmacy,
   decrementing stock atomically.
3. `POST /orders/{id}/payment-proof` stores the proof; payment is confirmed after a delay
   and the order details move to `Processing`.
4. Pharmacists ship (`Shipped`); the customer confirms or delivery completes automatically
   (`Delivered`).

Order details can be cancelled while `Pending` or `Processing`.

## Identity

Requests carry the authenticated caller in `x-user-id` (customers) or `x-pharmacist-id`
(pharmacists), set by the gateway.

## Error Handling

Failures return an `ErrorResponse` with a stable machine-readable `code`:

```json
{
  "error": "Bad Request",
  "message": "invalid delivery data: no delivery option 'express' for pharmacy ...",
  "code": "invalid_delivery_data",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

## Pagination

List endpoints accept `page` (default 1) and `limit` (default 20, max 100).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "cart", description = "Checkout preparation"),
        (name = "orders", description = "Customer order endpoints"),
        (name = "pharmacist", description = "Pharmacy order handling"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::carts::prepare_checkout,

        crate::handlers::orders::checkout,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::upload_payment_proof,
        crate::handlers::orders::confirm_delivery,

        crate::handlers::pharmacist::list_orders,
        crate::handlers::pharmacist::get_order,
        crate::handlers::pharmacist::ship_order,
        crate::handlers::pharmacist::delete_order,

        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::ListQuery,
            crate::ResponseMeta,

            crate::entities::OrderStatus,
            crate::handlers::carts::PrepareCheckoutRequest,
            crate::handlers::orders::StatusChangeResponse,
            crate::services::cart_snapshot::CartSnapshot,
            crate::services::cart_snapshot::PharmacyGroup,
            crate::services::cart_snapshot::SnapshotItem,
            crate::services::checkout::CheckoutRequest,
            crate::services::checkout::DeliverySelection,
            crate::services::checkout::CheckoutReceipt,
            crate::services::delivery_quotes::DeliveryQuote,
            crate::services::orders::OrderView,
            crate::services::orders::OrderDetailView,
            crate::services::orders::LineItemView,

            crate::handlers::health::HealthResponse,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
