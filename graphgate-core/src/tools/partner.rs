//! Partner API tools: customers, orders and locations.

use serde_json::{Map, Value, json};

use super::ToolDefinition;
use super::shaping::{
    Args, ObjectBuilder, ShapeError, list_properties, object_schema, with_pagination,
};
use crate::auth::EndpointKind;

const CUSTOMER_STATUSES: &[&str] = &["ACTIVE", "INACTIVE"];
const ORDER_STATUSES: &[&str] = &["PENDING", "PROCESSING", "SHIPPED", "DELIVERED", "CANCELLED"];

const LIST_CUSTOMERS: &str = r#"query ListCustomers($first: Int, $after: String, $filter: CustomerFilter) {
  customers(first: $first, after: $after, filter: $filter) {
    edges { cursor node { id name { first last } email phone status createdAt } }
    pageInfo { hasNextPage endCursor }
    totalCount
  }
}"#;

const GET_CUSTOMER: &str = r#"query GetCustomer($id: ID!) {
  customer(id: $id) {
    id name { first last } email phone status
    address { street city state zip }
    createdAt updatedAt
  }
}"#;

const CREATE_CUSTOMER: &str = r#"mutation CreateCustomer($input: CreateCustomerInput!) {
  createCustomer(input: $input) {
    customer {
      id name { first last } email phone status
      address { street city state zip }
      createdAt updatedAt
    }
  }
}"#;

const UPDATE_CUSTOMER: &str = r#"mutation UpdateCustomer($id: ID!, $input: UpdateCustomerInput!) {
  updateCustomer(id: $id, input: $input) {
    customer {
      id name { first last } email phone status
      address { street city state zip }
      createdAt updatedAt
    }
  }
}"#;

const LIST_ORDERS: &str = r#"query ListOrders($first: Int, $after: String, $filter: OrderFilter) {
  orders(first: $first, after: $after, filter: $filter) {
    edges { cursor node { id number status total { amount currency } customer { id } createdAt } }
    pageInfo { hasNextPage endCursor }
    totalCount
  }
}"#;

const GET_ORDER: &str = r#"query GetOrder($id: ID!) {
  order(id: $id) {
    id number status
    total { amount currency }
    customer { id name { first last } email }
    lineItems { sku description quantity unitPrice { amount currency } }
    location { id name }
    createdAt updatedAt
  }
}"#;

const LIST_LOCATIONS: &str = r#"query ListLocations($first: Int, $after: String, $filter: LocationFilter) {
  locations(first: $first, after: $after, filter: $filter) {
    edges { cursor node { id name address { street city state zip } phone } }
    pageInfo { hasNextPage endCursor }
    totalCount
  }
}"#;

pub fn tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "list_customers",
            description: "List customers, optionally filtered by search text or status.",
            category: "customers",
            endpoint: EndpointKind::Partner,
            input_schema: object_schema(
                list_properties(json!({
                    "search": {"type": "string", "description": "Matches name or email."},
                    "status": {"type": "string", "enum": CUSTOMER_STATUSES},
                })),
                &[],
            ),
            document: LIST_CUSTOMERS,
            result_path: "customers",
            shape: shape_list_customers,
        },
        ToolDefinition {
            name: "get_customer",
            description: "Fetch a single customer by id.",
            category: "customers",
            endpoint: EndpointKind::Partner,
            input_schema: object_schema(json!({"id": {"type": "string"}}), &["id"]),
            document: GET_CUSTOMER,
            result_path: "customer",
            shape: shape_by_id,
        },
        ToolDefinition {
            name: "create_customer",
            description: "Create a customer. Address fields are optional but sent together.",
            category: "customers",
            endpoint: EndpointKind::Partner,
            input_schema: object_schema(customer_properties(), &["firstName", "lastName"]),
            document: CREATE_CUSTOMER,
            result_path: "createCustomer.customer",
            shape: shape_create_customer,
        },
        ToolDefinition {
            name: "update_customer",
            description: "Update fields of an existing customer. Only supplied fields change.",
            category: "customers",
            endpoint: EndpointKind::Partner,
            input_schema: object_schema(
                {
                    let mut props = customer_properties();
                    if let Value::Object(map) = &mut props {
                        map.insert("id".to_string(), json!({"type": "string"}));
                        map.insert(
                            "status".to_string(),
                            json!({"type": "string", "enum": CUSTOMER_STATUSES}),
                        );
                    }
                    props
                },
                &["id"],
            ),
            document: UPDATE_CUSTOMER,
            result_path: "updateCustomer.customer",
            shape: shape_update_customer,
        },
        ToolDefinition {
            name: "list_orders",
            description: "List orders, optionally filtered by customer, status or creation date.",
            category: "orders",
            endpoint: EndpointKind::Partner,
            input_schema: object_schema(
                list_properties(json!({
                    "customerId": {"type": "string"},
                    "status": {"type": "string", "enum": ORDER_STATUSES},
                    "createdAfter": {"type": "string", "format": "date-time"},
                    "createdBefore": {"type": "string", "format": "date-time"},
                })),
                &[],
            ),
            document: LIST_ORDERS,
            result_path: "orders",
            shape: shape_list_orders,
        },
        ToolDefinition {
            name: "get_order",
            description: "Fetch a single order with its line items.",
            category: "orders",
            endpoint: EndpointKind::Partner,
            input_schema: object_schema(json!({"id": {"type": "string"}}), &["id"]),
            document: GET_ORDER,
            result_path: "order",
            shape: shape_by_id,
        },
        ToolDefinition {
            name: "list_locations",
            description: "List the partner's locations, optionally filtered by city or state.",
            category: "locations",
            endpoint: EndpointKind::Partner,
            input_schema: object_schema(
                list_properties(json!({
                    "city": {"type": "string"},
                    "state": {"type": "string"},
                })),
                &[],
            ),
            document: LIST_LOCATIONS,
            result_path: "locations",
            shape: shape_list_locations,
        },
    ]
}

fn customer_properties() -> Value {
    json!({
        "firstName": {"type": "string"},
        "lastName": {"type": "string"},
        "email": {"type": "string", "format": "email"},
        "phone": {"type": "string"},
        "street": {"type": "string"},
        "city": {"type": "string"},
        "state": {"type": "string"},
        "zip": {"type": "string"},
    })
}

pub(crate) fn shape_by_id(arguments: &Map<String, Value>) -> Result<Value, ShapeError> {
    let args = Args::new(arguments);
    Ok(ObjectBuilder::new()
        .field("id", args.required_str("id")?)
        .build())
}

fn shape_list_customers(arguments: &Map<String, Value>) -> Result<Value, ShapeError> {
    let args = Args::new(arguments);
    let filter = ObjectBuilder::new()
        .optional("search", args.optional_str("search")?)
        .optional("status", args.optional_enum("status", CUSTOMER_STATUSES)?);
    Ok(with_pagination(args, ObjectBuilder::new())?
        .nested("filter", filter)
        .build())
}

fn address(args: Args<'_>) -> Result<ObjectBuilder, ShapeError> {
    Ok(ObjectBuilder::new()
        .optional("street", args.optional_str("street")?)
        .optional("city", args.optional_str("city")?)
        .optional("state", args.optional_str("state")?)
        .optional("zip", args.optional_str("zip")?))
}

fn shape_create_customer(arguments: &Map<String, Value>) -> Result<Value, ShapeError> {
    let args = Args::new(arguments);
    let name = ObjectBuilder::new()
        .field("first", args.required_str("firstName")?)
        .field("last", args.required_str("lastName")?);
    let input = ObjectBuilder::new()
        .nested("name", name)
        .optional("email", args.optional_str("email")?)
        .optional("phone", args.optional_str("phone")?)
        .nested("address", address(args)?);
    Ok(ObjectBuilder::new().nested("input", input).build())
}

fn shape_update_customer(arguments: &Map<String, Value>) -> Result<Value, ShapeError> {
    let args = Args::new(arguments);
    let id = args.required_str("id")?;
    let name = ObjectBuilder::new()
        .optional("first", args.optional_str("firstName")?)
        .optional("last", args.optional_str("lastName")?);
    let input = ObjectBuilder::new()
        .nested("name", name)
        .optional("email", args.optional_str("email")?)
        .optional("phone", args.optional_str("phone")?)
        .optional("status", args.optional_enum("status", CUSTOMER_STATUSES)?)
        .nested("address", address(args)?);
    if input.is_empty() {
        return Err(ShapeError::NothingToUpdate(
            "update_customer needs at least one field to change",
        ));
    }
    Ok(ObjectBuilder::new()
        .field("id", id)
        .nested("input", input)
        .build())
}

fn shape_list_orders(arguments: &Map<String, Value>) -> Result<Value, ShapeError> {
    let args = Args::new(arguments);
    let created_at = ObjectBuilder::new()
        .optional("after", args.optional_str("createdAfter")?)
        .optional("before", args.optional_str("createdBefore")?);
    let filter = ObjectBuilder::new()
        .optional("customerId", args.optional_str("customerId")?)
        .optional("status", args.optional_enum("status", ORDER_STATUSES)?)
        .nested("createdAt", created_at);
    Ok(with_pagination(args, ObjectBuilder::new())?
        .nested("filter", filter)
        .build())
}

fn shape_list_locations(arguments: &Map<String, Value>) -> Result<Value, ShapeError> {
    let args = Args::new(arguments);
    let filter = ObjectBuilder::new()
        .optional("city", args.optional_str("city")?)
        .optional("state", args.optional_str("state")?);
    Ok(with_pagination(args, ObjectBuilder::new())?
        .nested("filter", filter)
        .build())
}
