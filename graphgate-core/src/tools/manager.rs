//! Manager API tools: partners and their users.

use serde_json::{Map, Value, json};

use super::ToolDefinition;
use super::partner::shape_by_id;
use super::shaping::{
    Args, ObjectBuilder, ShapeError, list_properties, object_schema, with_pagination,
};
use crate::auth::EndpointKind;

const PARTNER_STATUSES: &[&str] = &["ACTIVE", "SUSPENDED", "PENDING"];
const USER_ROLES: &[&str] = &["ADMIN", "MEMBER", "VIEWER"];

const LIST_PARTNERS: &str = r#"query ListPartners($first: Int, $after: String, $filter: PartnerFilter) {
  partners(first: $first, after: $after, filter: $filter) {
    edges { cursor node { id code name status createdAt } }
    pageInfo { hasNextPage endCursor }
    totalCount
  }
}"#;

const GET_PARTNER: &str = r#"query GetPartner($id: ID!) {
  partner(id: $id) {
    id code name status
    contact { email phone }
    createdAt updatedAt
  }
}"#;

const UPDATE_PARTNER_STATUS: &str = r#"mutation UpdatePartnerStatus($id: ID!, $input: PartnerStatusInput!) {
  updatePartnerStatus(id: $id, input: $input) {
    partner { id code name status updatedAt }
  }
}"#;

const LIST_USERS: &str = r#"query ListUsers($partnerId: ID!, $first: Int, $after: String, $filter: UserFilter) {
  partner(id: $partnerId) {
    users(first: $first, after: $after, filter: $filter) {
      edges { cursor node { id email role profile { firstName lastName } createdAt } }
      pageInfo { hasNextPage endCursor }
      totalCount
    }
  }
}"#;

const CREATE_USER: &str = r#"mutation CreateUser($partnerId: ID!, $input: CreateUserInput!) {
  createUser(partnerId: $partnerId, input: $input) {
    user { id email role profile { firstName lastName } createdAt }
  }
}"#;

pub fn tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "list_partners",
            description: "List partner accounts, optionally filtered by search text or status.",
            category: "partners",
            endpoint: EndpointKind::Manager,
            input_schema: object_schema(
                list_properties(json!({
                    "search": {"type": "string", "description": "Matches partner name or code."},
                    "status": {"type": "string", "enum": PARTNER_STATUSES},
                })),
                &[],
            ),
            document: LIST_PARTNERS,
            result_path: "partners",
            shape: shape_list_partners,
        },
        ToolDefinition {
            name: "get_partner",
            description: "Fetch a single partner account by id.",
            category: "partners",
            endpoint: EndpointKind::Manager,
            input_schema: object_schema(json!({"id": {"type": "string"}}), &["id"]),
            document: GET_PARTNER,
            result_path: "partner",
            shape: shape_by_id,
        },
        ToolDefinition {
            name: "update_partner_status",
            description: "Activate, suspend or park a partner account.",
            category: "partners",
            endpoint: EndpointKind::Manager,
            input_schema: object_schema(
                json!({
                    "id": {"type": "string"},
                    "status": {"type": "string", "enum": PARTNER_STATUSES},
                    "reason": {"type": "string", "description": "Recorded in the audit trail."},
                }),
                &["id", "status"],
            ),
            document: UPDATE_PARTNER_STATUS,
            result_path: "updatePartnerStatus.partner",
            shape: shape_update_partner_status,
        },
        ToolDefinition {
            name: "list_users",
            description: "List the users of a partner account, optionally filtered by role.",
            category: "users",
            endpoint: EndpointKind::Manager,
            input_schema: object_schema(
                list_properties(json!({
                    "partnerId": {"type": "string"},
                    "role": {"type": "string", "enum": USER_ROLES},
                })),
                &["partnerId"],
            ),
            document: LIST_USERS,
            result_path: "partner.users",
            shape: shape_list_users,
        },
        ToolDefinition {
            name: "create_user",
            description: "Create a user under a partner account.",
            category: "users",
            endpoint: EndpointKind::Manager,
            input_schema: object_schema(
                json!({
                    "partnerId": {"type": "string"},
                    "firstName": {"type": "string"},
                    "lastName": {"type": "string"},
                    "email": {"type": "string", "format": "email"},
                    "role": {"type": "string", "enum": USER_ROLES},
                }),
                &["partnerId", "firstName", "lastName", "email"],
            ),
            document: CREATE_USER,
            result_path: "createUser.user",
            shape: shape_create_user,
        },
    ]
}

fn shape_list_partners(arguments: &Map<String, Value>) -> Result<Value, ShapeError> {
    let args = Args::new(arguments);
    let filter = ObjectBuilder::new()
        .optional("search", args.optional_str("search")?)
        .optional("status", args.optional_enum("status", PARTNER_STATUSES)?);
    Ok(with_pagination(args, ObjectBuilder::new())?
        .nested("filter", filter)
        .build())
}

fn shape_update_partner_status(arguments: &Map<String, Value>) -> Result<Value, ShapeError> {
    let args = Args::new(arguments);
    let input = ObjectBuilder::new()
        .field("status", args.required_enum("status", PARTNER_STATUSES)?)
        .optional("reason", args.optional_str("reason")?);
    Ok(ObjectBuilder::new()
        .field("id", args.required_str("id")?)
        .nested("input", input)
        .build())
}

fn shape_list_users(arguments: &Map<String, Value>) -> Result<Value, ShapeError> {
    let args = Args::new(arguments);
    let vars = ObjectBuilder::new().field("partnerId", args.required_str("partnerId")?);
    let filter = ObjectBuilder::new().optional("role", args.optional_enum("role", USER_ROLES)?);
    Ok(with_pagination(args, vars)?.nested("filter", filter).build())
}

fn shape_create_user(arguments: &Map<String, Value>) -> Result<Value, ShapeError> {
    let args = Args::new(arguments);
    let profile = ObjectBuilder::new()
        .field("firstName", args.required_str("firstName")?)
        .field("lastName", args.required_str("lastName")?);
    let input = ObjectBuilder::new()
        .nested("profile", profile)
        .field("email", args.required_str("email")?)
        .optional("role", args.optional_enum("role", USER_ROLES)?);
    Ok(ObjectBuilder::new()
        .field("partnerId", args.required_str("partnerId")?)
        .nested("input", input)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_list_partners_no_filters() {
        assert_eq!(shape_list_partners(&Map::new()).unwrap(), json!({}));
    }

    #[test]
    fn test_update_partner_status() {
        let vars = shape_update_partner_status(&map(json!({
            "id": "ptn_1",
            "status": "suspended"
        })))
        .unwrap();
        assert_eq!(vars, json!({"id": "ptn_1", "input": {"status": "SUSPENDED"}}));

        let err = shape_update_partner_status(&map(json!({"id": "ptn_1"}))).unwrap_err();
        assert_eq!(err, ShapeError::Missing("status"));
    }

    #[test]
    fn test_list_users_requires_partner() {
        assert_eq!(
            shape_list_users(&Map::new()).unwrap_err(),
            ShapeError::Missing("partnerId")
        );
        let vars = shape_list_users(&map(json!({"partnerId": "ptn_1", "role": "admin"}))).unwrap();
        assert_eq!(vars, json!({"partnerId": "ptn_1", "filter": {"role": "ADMIN"}}));
    }

    #[test]
    fn test_create_user_nests_profile() {
        let vars = shape_create_user(&map(json!({
            "partnerId": "ptn_1",
            "firstName": "Alan",
            "lastName": "Turing",
            "email": "alan@example.com"
        })))
        .unwrap();
        assert_eq!(
            vars,
            json!({
                "partnerId": "ptn_1",
                "input": {
                    "profile": {"firstName": "Alan", "lastName": "Turing"},
                    "email": "alan@example.com"
                }
            })
        );
    }

    #[test]
    fn test_create_user_rejects_wrong_type() {
        let err = shape_create_user(&map(json!({
            "partnerId": "ptn_1",
            "firstName": "Alan",
            "lastName": "Turing",
            "email": 42
        })))
        .unwrap_err();
        assert!(matches!(err, ShapeError::WrongType { name: "email", .. }));
    }
}
